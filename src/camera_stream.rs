//! Live camera viewer for the dashboard.
//!
//! One capture thread overwrites a single-slot mailbox. Readers copy the
//! latest frame out under a short lock; frames nobody read are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use crate::common::Frame;
use crate::frame_io::FrameSource;

#[derive(Debug, Default)]
pub struct LatestFrame {
    slot: Mutex<Option<Frame>>,
    published: AtomicU64,
}

impl LatestFrame {
    pub fn publish(&self, frame: Frame) {
        *self.slot.lock() = Some(frame);
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn latest(&self) -> Option<Frame> {
        self.slot.lock().clone()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}

pub struct CameraStream {
    mailbox: Arc<LatestFrame>,
    interval: Duration,
    worker: Option<(Sender<()>, JoinHandle<()>)>,
}

impl CameraStream {
    pub fn new(interval: Duration) -> Self {
        Self {
            mailbox: Arc::new(LatestFrame::default()),
            interval,
            worker: None,
        }
    }

    /// Starts capturing from `source`. Returns `false` if already running.
    pub fn start(&mut self, mut source: Box<dyn FrameSource>) -> bool {
        if self.is_running() {
            return false;
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let mailbox = Arc::clone(&self.mailbox);
        let interval = self.interval;
        let name = source.describe();

        let handle = std::thread::spawn(move || {
            log::info!("Camera stream started on {}", name);
            loop {
                match source.read_frame() {
                    Ok(Some(frame)) => mailbox.publish(frame),
                    Ok(None) => {
                        log::info!("Camera stream on {} ended", name);
                        break;
                    }
                    Err(err) => {
                        log::warn!("Camera stream read failed: {:#}", err);
                        break;
                    }
                }
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    // stop requested or the stream handle was dropped
                    _ => break,
                }
            }
        });

        self.worker = Some((stop_tx, handle));
        true
    }

    pub fn stop(&mut self) {
        if let Some((stop_tx, handle)) = self.worker.take() {
            drop(stop_tx);
            if handle.join().is_err() {
                log::error!("Camera stream thread panicked");
            }
            self.mailbox.clear();
            log::info!("Camera stream stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|(_, handle)| !handle.is_finished())
    }

    pub fn latest_frame(&self) -> Option<Frame> {
        self.mailbox.latest()
    }

    pub fn mailbox(&self) -> Arc<LatestFrame> {
        Arc::clone(&self.mailbox)
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct Counting {
        next: u64,
        limit: Option<u64>,
    }

    impl FrameSource for Counting {
        fn read_frame(&mut self) -> anyhow::Result<Option<Frame>> {
            if self.limit.is_some_and(|l| self.next >= l) {
                return Ok(None);
            }
            let frame = Frame::new(RgbImage::new(2, 2), self.next);
            self.next += 1;
            Ok(Some(frame))
        }

        fn describe(&self) -> String {
            "counter".to_string()
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not reached");
    }

    #[test]
    fn mailbox_keeps_only_latest() {
        let mailbox = LatestFrame::default();
        assert!(mailbox.latest().is_none());
        mailbox.publish(Frame::new(RgbImage::new(1, 1), 1));
        mailbox.publish(Frame::new(RgbImage::new(1, 1), 2));
        assert_eq!(mailbox.latest().unwrap().index, 2);
        assert_eq!(mailbox.published(), 2);
    }

    #[test]
    fn start_publishes_and_stop_joins() {
        let mut stream = CameraStream::new(Duration::from_millis(1));
        assert!(stream.start(Box::new(Counting { next: 0, limit: None })));
        assert!(!stream.start(Box::new(Counting { next: 0, limit: None })));

        let mailbox = stream.mailbox();
        wait_for(|| mailbox.published() >= 3);
        assert!(stream.latest_frame().is_some());

        stream.stop();
        assert!(!stream.is_running());
        assert!(stream.latest_frame().is_none());
    }

    #[test]
    fn finite_source_ends_the_thread() {
        let mut stream = CameraStream::new(Duration::from_millis(1));
        stream.start(Box::new(Counting { next: 0, limit: Some(2) }));
        wait_for(|| !stream.is_running());
        assert_eq!(stream.mailbox().published(), 2);
        assert_eq!(stream.latest_frame().unwrap().index, 1);
    }
}
