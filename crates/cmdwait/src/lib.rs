//! cmdwait - external process harness
//!
//! Starts commands through an interceptable, redacting starter and waits on
//! them with a deadline, an exit-code and output criterion, and a bounded
//! retry budget.

pub mod error;
pub mod handle;
pub mod helpers;
pub mod interceptor;
pub mod reporter;
pub mod starter;
pub mod waiter;

pub use error::{HarnessError, Result, WaitFailure};
pub use handle::{OutputBuffer, ProcessHandle};
pub use interceptor::{Interceptor, InterceptorGuard};
pub use reporter::{CommandReporter, Reporter};
pub use starter::{CommandStarter, Starter};
pub use waiter::{wait_with_retry, CmdWaiter, WaitReport};
