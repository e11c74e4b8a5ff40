//! Physical operator catalogue: producer, row-at-a-time transform, and
//! pipeline-breaking accumulator nodes that implement a logical plan's
//! nodes over the dataflow graph (spec §4.7).

pub mod aggregation;
pub mod arithmetic;
pub mod copy_insert;
pub mod ddl;
pub mod expr;
pub mod join;
pub mod limit;
pub mod order_by;
pub mod prefetch;
pub mod projection;
pub mod scan;
pub mod selection;

pub use aggregation::{AggregateFunc, AggregateSpec, AggregationMethod, GroupedAggregation, SimpleAggregation};
pub use arithmetic::Arithmetic;
pub use copy_insert::{Copy, Insert};
pub use ddl::{create_table, describe_columns, describe_table, show_tables, update_table_statistics, ColumnDescription};
pub use expr::{eval, eval_with, ArithmeticOp, Comparison, Expr};
pub use join::{choose_join_method, Join, JoinMethod, OutputColumn};
pub use limit::Limit;
pub use order_by::{choose_order_by_method, OrderBy, OrderByMethod, SortKey};
pub use prefetch::{select_prefetch_offsets, ColumnPrevalence, MAX_CACHE_LINES};
pub use projection::Projection;
pub use scan::{Scan, TableSelection};
pub use selection::Selection;
