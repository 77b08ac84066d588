//! Watcher-wide option flags.

use bitflags::bitflags;

bitflags! {
    /// Options that change watcher behavior beyond handler dispatch.
    ///
    /// Options are OR'ed together and apply to the whole watcher, not to a
    /// single watched path.
    ///
    /// # Examples
    ///
    /// ```
    /// use fw_core::WatchOptions;
    ///
    /// let mut options = WatchOptions::empty();
    /// options |= WatchOptions::DEBUG;
    /// assert!(options.is_debug());
    /// ```
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct WatchOptions: u32 {
        /// Emit lifecycle trace messages (constructing, starting, running,
        /// closing) at `info` level.
        const DEBUG = 1 << 0;
    }
}

impl WatchOptions {
    /// Returns `true` if [`WatchOptions::DEBUG`] is set.
    #[inline]
    #[must_use]
    pub const fn is_debug(self) -> bool {
        self.contains(Self::DEBUG)
    }
}
