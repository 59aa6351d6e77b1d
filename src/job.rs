//! Job registry: tracks every result stream currently attached to a
//! session, without the session owning the streams or the streams owning
//! the session. When a session ends (or is reset), it walks the registry
//! and notifies each live stream so in-flight iteration fails cleanly
//! instead of hanging.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// What a session tells an attached job when it can no longer service it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Ended,
    Reset,
}

/// Implemented by whatever owns the live state of one result stream.
/// `ResultStream` registers an `Rc<RefCell<dyn JobHandle>>`-shaped listener
/// with the session so the session never has to name the stream's concrete
/// type.
pub trait JobHandle {
    fn on_session_event(&mut self, event: SessionEvent);
}

/// A session-side registry of weak references to attached jobs. Streams
/// register themselves on creation and are dropped from the list lazily
/// (a dead `Weak` is simply skipped, and pruned opportunistically).
#[derive(Default)]
pub struct JobRegistry {
    jobs: RefCell<Vec<Weak<RefCell<dyn JobHandle>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job: &Rc<RefCell<dyn JobHandle>>) {
        self.jobs.borrow_mut().push(Rc::downgrade(job));
    }

    /// Notify every still-live job and drop the dead entries.
    pub fn notify_all(&self, event: SessionEvent) {
        let mut jobs = self.jobs.borrow_mut();
        jobs.retain(|weak| {
            if let Some(job) = weak.upgrade() {
                job.borrow_mut().on_session_event(event);
                true
            } else {
                false
            }
        });
    }

    pub fn len(&self) -> usize {
        self.jobs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        last: Option<SessionEvent>,
    }

    impl JobHandle for Recorder {
        fn on_session_event(&mut self, event: SessionEvent) {
            self.last = Some(event);
        }
    }

    #[test]
    fn notifies_live_job() {
        let registry = JobRegistry::new();
        let recorder = Rc::new(RefCell::new(Recorder { last: None }));
        let job: Rc<RefCell<dyn JobHandle>> = recorder.clone();
        registry.register(&job);
        registry.notify_all(SessionEvent::Ended);
        assert_eq!(recorder.borrow().last, Some(SessionEvent::Ended));
    }

    #[test]
    fn dead_job_is_pruned() {
        let registry = JobRegistry::new();
        {
            let recorder = Rc::new(RefCell::new(Recorder { last: None }));
            let job: Rc<RefCell<dyn JobHandle>> = recorder;
            registry.register(&job);
        }
        assert_eq!(registry.len(), 1);
        registry.notify_all(SessionEvent::Reset);
        assert!(registry.is_empty());
    }
}
