//! Readable panic payloads for logging.

use std::{any::Any, fmt};

/// Displays the message carried by a caught panic.
///
/// String payloads print as-is; anything else prints a placeholder.
///
/// ```
/// use filewire::panic::PanicMessage;
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
/// assert_eq!(PanicMessage::new(payload.as_ref()).to_string(), "boom");
/// let payload: Box<dyn std::any::Any + Send> = Box::new(5_u32);
/// assert_eq!(PanicMessage::new(payload.as_ref()).to_string(), "<non-string panic>");
/// ```
#[derive(Clone, Copy)]
#[must_use]
pub struct PanicMessage<'a>(&'a (dyn Any + Send));

impl<'a> PanicMessage<'a> {
    /// Wrap a caught panic payload.
    pub fn new(payload: &'a (dyn Any + Send)) -> Self { Self(payload) }
}

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            f.write_str("<non-string panic>")
        }
    }
}

impl fmt::Debug for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicMessage").field(&self.to_string()).finish()
    }
}
