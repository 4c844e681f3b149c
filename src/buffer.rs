//! # Message Buffers
//!
//! Lifecycle tracking for one in-flight message payload. The states form
//! a small machine:
//!
//! ```text
//! Empty ──fill──▶ Staged ──post_send──▶ Sent ──reset──▶ Empty
//! Empty ──set_awaiting──▶ Awaiting ──set_received──▶ Received ──take──▶ Empty
//! ```
//!
//! The in-flight variants (`Awaiting`, `Sent`) carry no storage at all:
//! while the message layer owns a transfer there is nothing here to
//! mutate. Illegal transitions are programmer errors and abort.

/// One message payload and its lifecycle state
#[derive(Debug)]
pub enum Buffer<T> {
    /// No payload, no outstanding operation
    Empty,
    /// Payload filled, not yet handed to the message layer
    Staged(Vec<T>),
    /// A receive is posted; the message layer owns the storage
    Awaiting,
    /// A send is posted; the payload has moved to the message layer
    Sent,
    /// A receive completed; contents are readable
    Received(Vec<T>),
}

impl<T> Buffer<T> {
    /// Fresh empty buffer
    pub fn new() -> Self {
        Self::Empty
    }

    fn state_name(&self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::Staged(_) => "Staged",
            Self::Awaiting => "Awaiting",
            Self::Sent => "Sent",
            Self::Received(_) => "Received",
        }
    }

    #[cold]
    fn illegal(&self, op: &str) -> ! {
        panic!("illegal buffer transition: {op} while {}", self.state_name())
    }

    /// Store a payload for sending (pre: `Empty`)
    pub fn fill(&mut self, payload: Vec<T>) {
        match self {
            Self::Empty => *self = Self::Staged(payload),
            _ => self.illegal("fill"),
        }
    }

    /// Hand the staged payload to the message layer (pre: `Staged`)
    pub fn post_send(&mut self) -> Vec<T> {
        match std::mem::replace(self, Self::Sent) {
            Self::Staged(payload) => payload,
            other => {
                *self = other;
                self.illegal("post_send")
            }
        }
    }

    /// Mark a receive as posted (pre: `Empty`)
    pub fn set_awaiting(&mut self) {
        match self {
            Self::Empty => *self = Self::Awaiting,
            _ => self.illegal("set_awaiting"),
        }
    }

    /// Record a completed receive (pre: `Awaiting`)
    pub fn set_received(&mut self, payload: Vec<T>) {
        match self {
            Self::Awaiting => *self = Self::Received(payload),
            _ => self.illegal("set_received"),
        }
    }

    /// Take the received contents (pre: `Received`; post: `Empty`)
    pub fn take(&mut self) -> Vec<T> {
        match std::mem::replace(self, Self::Empty) {
            Self::Received(payload) => payload,
            other => {
                *self = other;
                self.illegal("take")
            }
        }
    }

    /// Retire a completed send (pre: `Sent`; post: `Empty`)
    pub fn reset(&mut self) {
        match self {
            Self::Sent => *self = Self::Empty,
            _ => self.illegal("reset"),
        }
    }

    pub fn empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn staged(&self) -> bool {
        matches!(self, Self::Staged(_))
    }

    pub fn awaiting(&self) -> bool {
        matches!(self, Self::Awaiting)
    }

    pub fn sent(&self) -> bool {
        matches!(self, Self::Sent)
    }

    pub fn received(&self) -> bool {
        matches!(self, Self::Received(_))
    }
}

impl<T> Default for Buffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_cycle() {
        let mut buf: Buffer<u64> = Buffer::new();
        assert!(buf.empty());
        buf.fill(vec![42]);
        assert!(buf.staged());
        let payload = buf.post_send();
        assert_eq!(payload, vec![42]);
        assert!(buf.sent());
        buf.reset();
        assert!(buf.empty());
    }

    #[test]
    fn test_recv_cycle() {
        let mut buf: Buffer<u64> = Buffer::new();
        buf.set_awaiting();
        assert!(buf.awaiting());
        buf.set_received(vec![7, 8]);
        assert!(buf.received());
        assert_eq!(buf.take(), vec![7, 8]);
        assert!(buf.empty());
    }

    #[test]
    #[should_panic(expected = "illegal buffer transition: fill")]
    fn test_fill_while_awaiting_panics() {
        let mut buf: Buffer<u64> = Buffer::new();
        buf.set_awaiting();
        buf.fill(vec![1]);
    }

    #[test]
    #[should_panic(expected = "illegal buffer transition: post_send")]
    fn test_post_send_without_fill_panics() {
        let mut buf: Buffer<u64> = Buffer::new();
        buf.post_send();
    }

    #[test]
    #[should_panic(expected = "illegal buffer transition: take")]
    fn test_take_while_sent_panics() {
        let mut buf: Buffer<u64> = Buffer::new();
        buf.fill(vec![1]);
        let _ = buf.post_send();
        let _ = buf.take();
    }

    #[test]
    #[should_panic(expected = "illegal buffer transition: set_received")]
    fn test_set_received_without_post_panics() {
        let mut buf: Buffer<u64> = Buffer::new();
        buf.set_received(vec![1]);
    }
}
