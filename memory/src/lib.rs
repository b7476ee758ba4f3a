pub mod error;
pub mod foreign;
pub mod heap;
pub mod table;
pub mod value;


pub use error::HeapError;
pub use foreign::{Finalizer, FinalizeJob, ForeignRef, ForeignState, TypeTag};
pub use heap::{Heap, SweepReport, ThreadState};
pub use table::{Table, TableKey};
pub use value::{Kind, Value};
