//! Prefetch-set selection (spec §4.7.1): picks which byte offsets within a
//! tile the runtime's prefetch pipeline should issue hints for, bounded by
//! `MAX_CACHE_LINES`. The derivation of 17 is not documented upstream;
//! preserved verbatim.

use db_storage::Schema;

pub const MAX_CACHE_LINES: u16 = 17;
const CACHE_LINE: u16 = db_storage::CACHE_LINE as u16;

/// A column's prevalence score: the selectivity of the predicate over that
/// column (lower = more selective = more "prevalent", worth prefetching
/// first). `1.0` means "no predicate touches this column".
#[derive(Debug, Clone, Copy)]
pub struct ColumnPrevalence {
    pub column: usize,
    pub score: f32,
}

fn cache_lines_for(type_size: usize, iterations: u16) -> u16 {
    let bytes = type_size as u32 * iterations as u32;
    ((bytes + CACHE_LINE as u32 - 1) / CACHE_LINE as u32) as u16
}

/// Selects an ordered, deduplicated list of byte offsets to prefetch for a
/// tile-consuming operator. `prevalent` need not cover every column; columns
/// absent from it are treated as score `1.0` (untouched by any predicate).
pub fn select_prefetch_offsets(
    schema: &Schema,
    prevalent: &[ColumnPrevalence],
    prefer_prevalent_for_prefetching: bool,
) -> Vec<u32> {
    let mut offsets = vec![0u32]; // step 1: always the tile header.
    let mut budget = MAX_CACHE_LINES.saturating_sub(1);

    let mut scored: Vec<ColumnPrevalence> = (0..schema.column_count())
        .map(|c| {
            prevalent
                .iter()
                .find(|p| p.column == c)
                .copied()
                .unwrap_or(ColumnPrevalence { column: c, score: 1.0 })
        })
        .collect();
    scored.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap());

    // Step 2: does the whole tile (every touched column, fully) fit?
    let full_lines: u16 = scored
        .iter()
        .map(|c| {
            let ty = schema.column(c.column).ty;
            cache_lines_for(ty.size(), db_storage::TUPLES_PER_TILE as u16)
        })
        .sum();

    if full_lines <= budget {
        for c in &scored {
            push_column(schema, c.column, db_storage::TUPLES_PER_TILE as u16, &mut offsets);
        }
        return dedup(offsets);
    }

    // Step 3: filter out the least prevalent column with score == 1.0 (no
    // predicate interest) and retry the "fits entirely" check with the rest.
    let filtered: Vec<ColumnPrevalence> = scored.iter().copied().filter(|c| c.score < 1.0).collect();
    let filtered_lines: u16 = filtered
        .iter()
        .map(|c| cache_lines_for(schema.column(c.column).ty.size(), db_storage::TUPLES_PER_TILE as u16))
        .sum();

    let working_set: Vec<ColumnPrevalence> = if !filtered.is_empty() && filtered_lines <= budget {
        filtered.clone()
    } else {
        scored.clone()
    };

    // Step 4: a very dominant column gets prefetched fully on its own first.
    if prefer_prevalent_for_prefetching {
        if let Some(dominant) = working_set.iter().find(|c| c.score < 0.12) {
            let ty = schema.column(dominant.column).ty;
            let lines = cache_lines_for(ty.size(), db_storage::TUPLES_PER_TILE as u16).min(budget);
            let iterations = iterations_fitting(ty.size(), lines);
            push_column(schema, dominant.column, iterations, &mut offsets);
            budget = budget.saturating_sub(lines);
        }
    }

    // Step 5: for the remaining budget, prefetch as many leading tuples of
    // each remaining column as fit, most prevalent first.
    for c in &working_set {
        if budget == 0 {
            break;
        }
        let ty = schema.column(c.column).ty;
        let max_lines = cache_lines_for(ty.size(), db_storage::TUPLES_PER_TILE as u16);
        let lines = max_lines.min(budget);
        if lines == 0 {
            continue;
        }
        let iterations = iterations_fitting(ty.size(), lines);
        if iterations == 0 {
            continue;
        }
        push_column(schema, c.column, iterations, &mut offsets);
        budget = budget.saturating_sub(lines);
    }

    dedup(offsets)
}

fn iterations_fitting(type_size: usize, lines: u16) -> u16 {
    if type_size == 0 {
        return 0;
    }
    ((lines as u32 * CACHE_LINE as u32) / type_size as u32) as u16
}

fn push_column(schema: &Schema, column: usize, iterations: u16, offsets: &mut Vec<u32>) {
    let ty = schema.column(column).ty;
    let base = db_storage::TILE_HEADER_SIZE as u32 + schema.pax_offset(column) as u32;
    let mut cursor = base;
    let step = CACHE_LINE as u32;
    let bytes = (ty.size() as u32 * iterations as u32).min((db_storage::TUPLES_PER_TILE * ty.size()) as u32);
    let lines = (bytes + step - 1) / step.max(1);
    for _ in 0..lines.max(1) {
        offsets.push(cursor);
        cursor += step;
    }
}

fn dedup(mut offsets: Vec<u32>) -> Vec<u32> {
    offsets.sort_unstable();
    offsets.dedup();
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_storage::{Column, ColumnType};

    #[test]
    fn header_offset_is_always_first() {
        let schema = Schema::new(vec![Column::new("a", ColumnType::Int32)]);
        let offsets = select_prefetch_offsets(&schema, &[], false);
        assert_eq!(offsets[0], 0);
    }

    #[test]
    fn small_tile_fits_entirely_within_budget() {
        let schema = Schema::new(vec![Column::new("a", ColumnType::Bool)]);
        let offsets = select_prefetch_offsets(&schema, &[], false);
        assert!(offsets.len() as u16 <= MAX_CACHE_LINES);
    }

    #[test]
    fn dominant_column_is_prioritised_when_flag_is_set() {
        let schema = Schema::new(vec![
            Column::new("a", ColumnType::Int64),
            Column::new("b", ColumnType::Int64),
        ]);
        let prevalent = vec![
            ColumnPrevalence { column: 0, score: 0.01 },
            ColumnPrevalence { column: 1, score: 0.9 },
        ];
        let offsets = select_prefetch_offsets(&schema, &prevalent, true);
        assert!(offsets.len() as u16 <= MAX_CACHE_LINES);
    }
}
