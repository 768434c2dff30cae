use crate::error::{Error, ErrorCode};

/// Runs a closure when dropped.
pub struct ScopeGuard<F: FnOnce()> {
    dropfn: Option<F>,
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(dropfn) = self.dropfn.take() {
            dropfn();
        }
    }
}

pub fn defer<F: FnOnce()>(dropfn: F) -> ScopeGuard<F> {
    ScopeGuard {
        dropfn: Some(dropfn),
    }
}

pub(crate) trait OptionExt<T> {
    fn ok_or_not_connected(self) -> Result<T, Error>;
}

impl<T> OptionExt<T> for Option<T> {
    #[track_caller]
    fn ok_or_not_connected(self) -> Result<T, Error> {
        self.ok_or_else(|| ErrorCode::BleNotConnected.into())
    }
}
