use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Fixed-depth FIFO of received frames sitting between packet intake and
/// the render path. A queued frame is never overwritten: when every slot
/// holds an unrendered frame, the newest arrival is dropped and counted.
pub struct FrameRing {
    slots: Vec<Vec<u8>>,
    lens: Vec<usize>,
    head: usize,
    tail: usize,
    queued: usize,
    dropped: u64,
}

impl FrameRing {
    /// `depth` slots, each preallocated to `frame_size` bytes.
    pub fn new(depth: usize, frame_size: usize) -> FrameRing {
        assert!(depth > 0, "frame ring depth must be at least 1");
        FrameRing {
            slots: (0..depth).map(|_| vec![0u8; frame_size]).collect(),
            lens: vec![0; depth],
            head: 0,
            tail: 0,
            queued: 0,
            dropped: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.queued
    }

    pub fn is_empty(&self) -> bool {
        self.queued == 0
    }

    pub fn is_full(&self) -> bool {
        self.queued == self.slots.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Copies one datagram payload into the next free slot. Returns `false`
    /// when the ring is full; payloads longer than the slot are truncated.
    pub fn push(&mut self, payload: &[u8]) -> bool {
        if self.is_full() {
            self.dropped += 1;
            return false;
        }
        let slot = &mut self.slots[self.head];
        let take = payload.len().min(slot.len());
        slot[..take].copy_from_slice(&payload[..take]);
        self.lens[self.head] = take;
        self.head = advance(self.head, self.slots.len());
        self.queued += 1;
        true
    }

    /// Copies the oldest frame into `out`, returning its length. `out` must
    /// be at least as large as the ring's frame size.
    pub fn pop_into(&mut self, out: &mut [u8]) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let len = self.lens[self.tail];
        out[..len].copy_from_slice(&self.slots[self.tail][..len]);
        self.tail = advance(self.tail, self.slots.len());
        self.queued -= 1;
        Some(len)
    }
}

fn advance(idx: usize, depth: usize) -> usize {
    let next = idx + 1;
    if next == depth {
        0
    } else {
        next
    }
}

/// Handle shared between the intake loop and the render worker. The lock is
/// held only for the copy in or out, never across a render.
#[derive(Clone)]
pub struct SharedRing {
    inner: Arc<RingInner>,
}

struct RingInner {
    ring: Mutex<FrameRing>,
    frame_ready: Condvar,
}

impl SharedRing {
    pub fn new(depth: usize, frame_size: usize) -> SharedRing {
        SharedRing {
            inner: Arc::new(RingInner {
                ring: Mutex::new(FrameRing::new(depth, frame_size)),
                frame_ready: Condvar::new(),
            }),
        }
    }

    pub fn push(&self, payload: &[u8]) -> bool {
        let accepted = self
            .inner
            .ring
            .lock()
            .expect("frame ring lock poisoned")
            .push(payload);
        if accepted {
            self.inner.frame_ready.notify_one();
        }
        accepted
    }

    pub fn pop_into(&self, out: &mut [u8]) -> Option<usize> {
        self.inner
            .ring
            .lock()
            .expect("frame ring lock poisoned")
            .pop_into(out)
    }

    /// Blocks up to `timeout` for a frame to arrive.
    pub fn wait_pop_into(&self, out: &mut [u8], timeout: Duration) -> Option<usize> {
        let ring = self.inner.ring.lock().expect("frame ring lock poisoned");
        let (mut ring, _) = self
            .inner
            .frame_ready
            .wait_timeout_while(ring, timeout, |r| r.is_empty())
            .expect("frame ring lock poisoned");
        ring.pop_into(out)
    }

    pub fn dropped(&self) -> u64 {
        self.inner
            .ring
            .lock()
            .expect("frame ring lock poisoned")
            .dropped()
    }
}
