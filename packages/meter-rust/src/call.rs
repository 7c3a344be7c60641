//! Wrapping a unit of work with a meter.

use std::convert::Infallible;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::context::{self, CurrentScope};
use crate::error::panic_message;
use crate::meter::Meter;

/// Values a wrapped call may return, rendered into the OK event as `result=`.
pub trait ResultValue {
    /// Text recorded as the result, or `None` to record nothing.
    fn describe(&self) -> Option<String>;
}

impl ResultValue for () {
    fn describe(&self) -> Option<String> {
        None
    }
}

impl<T: ResultValue> ResultValue for Option<T> {
    fn describe(&self) -> Option<String> {
        self.as_ref().and_then(ResultValue::describe)
    }
}

impl<T: ResultValue + ?Sized> ResultValue for Box<T> {
    fn describe(&self) -> Option<String> {
        (**self).describe()
    }
}

impl<T: ResultValue> ResultValue for Vec<T> {
    fn describe(&self) -> Option<String> {
        Some(format!("{} items", self.len()))
    }
}

macro_rules! display_result {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ResultValue for $ty {
                fn describe(&self) -> Option<String> {
                    Some(self.to_string())
                }
            }
        )*
    };
}

display_result!(
    String, &str, bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize,
    f32, f64,
);

impl Meter {
    /// Runs `work` as this meter's operation.
    ///
    /// Starts the meter if needed and keeps it current on this thread while
    /// `work` runs. If `work` leaves the meter running, the outcome follows
    /// the return: `Ok(v)` terminates OK with `v` as result, `Err(e)` fails
    /// with [`fail_error`](Meter::fail_error). A panic fails the meter with
    /// path `"panic"` and is then resumed. Outcomes set by `work` itself are
    /// kept, and the return value is passed through unchanged in every case.
    pub fn call<T, E, F>(&mut self, work: F) -> Result<T, E>
    where
        T: ResultValue,
        E: fmt::Display,
        F: FnOnce(&mut Meter) -> Result<T, E>,
    {
        let previous = context::current();
        if self.start_time() == 0 {
            self.start();
        }
        let outcome = {
            let _scope = CurrentScope::install(Arc::clone(self.identity()), previous);
            panic::catch_unwind(AssertUnwindSafe(|| work(&mut *self)))
        };
        match outcome {
            Ok(Ok(value)) => {
                if self.is_running() {
                    self.set_result(value.describe());
                    self.ok();
                }
                Ok(value)
            }
            Ok(Err(error)) => {
                if self.is_running() {
                    self.fail_error(&error);
                }
                Err(error)
            }
            Err(payload) => {
                if self.is_running() {
                    self.fail_panic(panic_message(payload.as_ref()));
                }
                panic::resume_unwind(payload)
            }
        }
    }

    /// Runs infallible `work` as this meter's operation, see [`call`](Meter::call).
    pub fn run<F>(&mut self, work: F) -> &mut Self
    where
        F: FnOnce(&mut Meter),
    {
        let _ = self.call(|meter| {
            work(meter);
            Ok::<(), Infallible>(())
        });
        self
    }
}
