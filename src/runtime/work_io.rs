/// Work IO
///
/// Communicate between `work()` and the runtime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkIo {
    /// Call block again, even if no new input or output space arrives
    pub call_again: bool,
    /// Mark block as finished
    pub finished: bool,
}

impl WorkIo {
    /// Reset both flags before the next call.
    pub(crate) fn clear(&mut self) {
        self.call_again = false;
        self.finished = false;
    }
}
