//! Upstream networking stack contract.

use std::sync::{Arc, Mutex};

use crate::packet::RxFrame;

/// What the driver calls back into.
///
/// Callbacks run from interrupt, poll and timer context; implementations must not call back
/// into the same device's `close()` or `down()`.
pub trait NetStack: Send + Sync {
    /// Delivers one received frame.
    fn receive(&self, frame: RxFrame);

    /// Carrier went up or down.
    fn carrier_changed(&self, _up: bool) {}

    /// The Tx queue was stopped and space is available again.
    fn wake_queue(&self) {}

    /// Poll mode: the interrupt handler deferred work to the poll task.
    fn schedule_poll(&self) {}
}

impl<T: NetStack + ?Sized> NetStack for Box<T> {
    fn receive(&self, frame: RxFrame) {
        (**self).receive(frame)
    }

    fn carrier_changed(&self, up: bool) {
        (**self).carrier_changed(up)
    }

    fn wake_queue(&self) {
        (**self).wake_queue()
    }

    fn schedule_poll(&self) {
        (**self).schedule_poll()
    }
}

impl<T: NetStack + ?Sized> NetStack for Arc<T> {
    fn receive(&self, frame: RxFrame) {
        (**self).receive(frame)
    }

    fn carrier_changed(&self, up: bool) {
        (**self).carrier_changed(up)
    }

    fn wake_queue(&self) {
        (**self).wake_queue()
    }

    fn schedule_poll(&self) {
        (**self).schedule_poll()
    }
}

impl NetStack for () {
    fn receive(&self, _frame: RxFrame) {}
}

impl<T: NetStack> NetStack for Option<T> {
    fn receive(&self, frame: RxFrame) {
        if let Some(stack) = self {
            stack.receive(frame);
        }
    }

    fn carrier_changed(&self, up: bool) {
        if let Some(stack) = self {
            stack.carrier_changed(up);
        }
    }

    fn wake_queue(&self) {
        if let Some(stack) = self {
            stack.wake_queue();
        }
    }

    fn schedule_poll(&self) {
        if let Some(stack) = self {
            stack.schedule_poll();
        }
    }
}

/// Stack that records every callback; handy for tests and host glue that drains in batches.
#[derive(Debug, Default)]
pub struct RecordingStack {
    inner: Mutex<Recorded>,
}

#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub frames: Vec<RxFrame>,
    pub carrier: Vec<bool>,
    pub wakes: usize,
    pub polls_scheduled: usize,
}

impl RecordingStack {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn take_frames(&self) -> Vec<RxFrame> {
        std::mem::take(&mut self.lock().frames)
    }

    pub fn snapshot(&self) -> Recorded {
        self.lock().clone()
    }

    pub fn carrier(&self) -> Option<bool> {
        self.lock().carrier.last().copied()
    }

    pub fn wakes(&self) -> usize {
        self.lock().wakes
    }

    pub fn polls_scheduled(&self) -> usize {
        self.lock().polls_scheduled
    }
}

impl NetStack for RecordingStack {
    fn receive(&self, frame: RxFrame) {
        self.lock().frames.push(frame);
    }

    fn carrier_changed(&self, up: bool) {
        self.lock().carrier.push(up);
    }

    fn wake_queue(&self) {
        self.lock().wakes += 1;
    }

    fn schedule_poll(&self) {
        self.lock().polls_scheduled += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::RxChecksum;

    fn frame() -> RxFrame {
        RxFrame {
            data: vec![1, 2, 3],
            checksum: RxChecksum::None,
            vlan: None,
        }
    }

    #[test]
    fn wrappers_forward_to_inner_stack() {
        let rec = Arc::new(RecordingStack::new());
        let boxed: Box<dyn NetStack> = Box::new(Arc::clone(&rec));
        boxed.receive(frame());
        boxed.carrier_changed(true);
        boxed.wake_queue();

        let some = Some(Arc::clone(&rec));
        some.schedule_poll();
        let none: Option<Arc<RecordingStack>> = None;
        none.receive(frame());

        let seen = rec.snapshot();
        assert_eq!(seen.frames.len(), 1);
        assert_eq!(seen.carrier, vec![true]);
        assert_eq!(seen.wakes, 1);
        assert_eq!(seen.polls_scheduled, 1);
    }
}
