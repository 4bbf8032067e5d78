pub mod clock;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{FieldError, OperationKind, Result, StoreError, io_error_code};
