//! Packed 64-bit resource handle: the token payload and annotation target
//! used throughout the runtime and dataflow graph to say "this data lives on
//! worker W" without a separate lookup.
//!
//! Layout, high to low byte: `[owner_worker_id: 8][flags: 8][address: 48]`.
//! A zero word is the canonical null pointer.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResourceFlags: u8 {
        const READ_ONLY   = 0b0000_0001;
        const TILE        = 0b0000_0010;
        const INDEX       = 0b0000_0100;
        const PINNED      = 0b0000_1000;
    }
}

const ADDRESS_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;
const FLAGS_SHIFT: u32 = 48;
const OWNER_SHIFT: u32 = 56;

/// Opaque handle to runtime-managed memory, tagged with its owning worker.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ResourcePointer(u64);

impl ResourcePointer {
    pub const NULL: ResourcePointer = ResourcePointer(0);

    pub fn new(owner_worker_id: u8, flags: ResourceFlags, address: usize) -> Self {
        debug_assert!(
            address as u64 & !ADDRESS_MASK == 0,
            "address does not fit in 48 bits"
        );
        let word = ((owner_worker_id as u64) << OWNER_SHIFT)
            | ((flags.bits() as u64) << FLAGS_SHIFT)
            | (address as u64 & ADDRESS_MASK);
        ResourcePointer(word)
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    pub fn owner_worker_id(&self) -> u8 {
        (self.0 >> OWNER_SHIFT) as u8
    }

    pub fn flags(&self) -> ResourceFlags {
        ResourceFlags::from_bits_truncate((self.0 >> FLAGS_SHIFT) as u8)
    }

    pub fn address(&self) -> usize {
        (self.0 & ADDRESS_MASK) as usize
    }

    /// Reinterprets the pointer as a reference to `T`.
    ///
    /// # Safety
    /// The caller must guarantee that the address was produced from a valid
    /// `&T` (or `&mut T`) still alive for the lifetime `'a`, and that `T`'s
    /// alignment matches the original allocation.
    pub unsafe fn get<'a, T>(&self) -> &'a T {
        &*(self.address() as *const T)
    }

    /// # Safety
    /// Same obligations as [`ResourcePointer::get`], plus exclusive access.
    pub unsafe fn get_mut<'a, T>(&self) -> &'a mut T {
        &mut *(self.address() as *mut T)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Debug for ResourcePointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            return write!(f, "ResourcePointer(null)");
        }
        f.debug_struct("ResourcePointer")
            .field("owner_worker_id", &self.owner_worker_id())
            .field("flags", &self.flags())
            .field("address", &format_args!("{:#x}", self.address()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_all_zero() {
        assert_eq!(ResourcePointer::NULL.as_u64(), 0);
        assert!(ResourcePointer::NULL.is_null());
    }

    #[test]
    fn round_trips_owner_flags_address() {
        let ptr = ResourcePointer::new(7, ResourceFlags::TILE | ResourceFlags::READ_ONLY, 0xABCDEF);
        assert_eq!(ptr.owner_worker_id(), 7);
        assert!(ptr.flags().contains(ResourceFlags::TILE));
        assert!(ptr.flags().contains(ResourceFlags::READ_ONLY));
        assert_eq!(ptr.address(), 0xABCDEF);
        assert!(!ptr.is_null());
    }

    #[test]
    fn get_dereferences_live_value() {
        let value: u64 = 42;
        let ptr = ResourcePointer::new(0, ResourceFlags::empty(), &value as *const u64 as usize);
        unsafe {
            assert_eq!(*ptr.get::<u64>(), 42);
        }
    }
}
