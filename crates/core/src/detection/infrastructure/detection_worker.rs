use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::detection::domain::object_detector::{DetectError, ObjectDetector};
use crate::shared::detection::Detection;
use crate::shared::frame::{Frame, FrameInfo};

/// Result of one detect call made on the worker thread.
pub struct DetectionReply {
    /// The frame the detections belong to, including its session generation.
    pub frame: FrameInfo,
    pub result: Result<Vec<Detection>, DetectError>,
    pub elapsed_ms: f64,
}

/// Runs the detector on a background thread, one frame at a time.
///
/// Keeps the caller's control flow free while inference is in flight, so
/// the camera can be switched or stopped mid-call. Replies are tagged with
/// the submitting frame's generation and it is up to the caller to discard
/// the ones that no longer match the live session.
pub struct DetectionWorker {
    requests: Option<Sender<Frame>>,
    replies: Receiver<DetectionReply>,
    in_flight: Option<FrameInfo>,
    handle: Option<JoinHandle<()>>,
}

impl DetectionWorker {
    pub fn spawn(mut detector: Box<dyn ObjectDetector>) -> Self {
        let (req_tx, req_rx) = crossbeam_channel::bounded::<Frame>(1);
        let (reply_tx, reply_rx) = crossbeam_channel::unbounded::<DetectionReply>();

        let handle = thread::spawn(move || {
            for frame in req_rx.iter() {
                let started = Instant::now();
                let result = detector.detect(&frame);
                let reply = DetectionReply {
                    frame: frame.info(),
                    result,
                    elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
                };
                if reply_tx.send(reply).is_err() {
                    break;
                }
            }
            log::debug!("Detection worker exiting");
        });

        Self {
            requests: Some(req_tx),
            replies: reply_rx,
            in_flight: None,
            handle: Some(handle),
        }
    }

    /// Whether a submitted frame has not been answered yet.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Hands a frame to the worker. Only one frame is in flight at a time.
    pub fn submit(&mut self, frame: Frame) -> Result<(), DetectError> {
        if self.in_flight.is_some() {
            return Err(DetectError::Inference("a frame is already in flight".into()));
        }
        let tx = self.requests.as_ref().ok_or(DetectError::WorkerGone)?;
        let info = frame.info();
        tx.send(frame).map_err(|_| DetectError::WorkerGone)?;
        self.in_flight = Some(info);
        Ok(())
    }

    /// Returns the pending reply if it has arrived.
    pub fn try_reply(&mut self) -> Option<DetectionReply> {
        match self.replies.try_recv() {
            Ok(reply) => {
                self.in_flight = None;
                Some(reply)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.lost(),
        }
    }

    /// Waits up to `timeout` for the pending reply.
    pub fn recv_reply_timeout(&mut self, timeout: Duration) -> Option<DetectionReply> {
        match self.replies.recv_timeout(timeout) {
            Ok(reply) => {
                self.in_flight = None;
                Some(reply)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => self.lost(),
        }
    }

    /// The worker thread died (the detector panicked); report the pending
    /// frame as failed once so the caller does not wait forever.
    fn lost(&mut self) -> Option<DetectionReply> {
        let frame = self.in_flight.take()?;
        self.requests = None;
        Some(DetectionReply {
            frame,
            result: Err(DetectError::WorkerGone),
            elapsed_ms: 0.0,
        })
    }
}

impl Drop for DetectionWorker {
    fn drop(&mut self) {
        self.requests = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;
    use std::sync::{Arc, Mutex};

    struct EchoDetector {
        seen: Arc<Mutex<Vec<usize>>>,
    }

    impl ObjectDetector for EchoDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
            self.seen.lock().unwrap().push(frame.index());
            Ok(vec![Detection::new(
                "cup",
                0.9,
                BoundingBox::new(frame.index() as f64, 0.0, 1.0, 1.0),
            )])
        }
    }

    struct FailingDetector;

    impl ObjectDetector for FailingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectError> {
            Err(DetectError::Inference("boom".into()))
        }
    }

    struct PanickingDetector;

    impl ObjectDetector for PanickingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectError> {
            panic!("detector crashed");
        }
    }

    fn frame(index: usize, generation: u64) -> Frame {
        Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, index).with_generation(generation)
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_reply_carries_frame_info_and_result() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut worker = DetectionWorker::spawn(Box::new(EchoDetector { seen: seen.clone() }));

        worker.submit(frame(3, 9)).unwrap();
        assert!(worker.is_busy());
        let reply = worker.recv_reply_timeout(WAIT).unwrap();

        assert!(!worker.is_busy());
        assert_eq!(reply.frame.generation, 9);
        assert_eq!(reply.frame.index, 3);
        assert_eq!(reply.result.unwrap()[0].bbox.x, 3.0);
        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }

    #[test]
    fn test_second_submit_while_busy_is_rejected() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut worker = DetectionWorker::spawn(Box::new(EchoDetector { seen }));
        worker.submit(frame(0, 1)).unwrap();
        assert!(worker.submit(frame(1, 1)).is_err());

        worker.recv_reply_timeout(WAIT).unwrap();
        worker.submit(frame(2, 1)).unwrap();
        assert_eq!(worker.recv_reply_timeout(WAIT).unwrap().frame.index, 2);
    }

    #[test]
    fn test_detector_errors_are_forwarded() {
        let mut worker = DetectionWorker::spawn(Box::new(FailingDetector));
        worker.submit(frame(0, 1)).unwrap();
        let reply = worker.recv_reply_timeout(WAIT).unwrap();
        assert!(matches!(reply.result, Err(DetectError::Inference(_))));
    }

    #[test]
    fn test_dead_worker_fails_pending_frame_once() {
        let mut worker = DetectionWorker::spawn(Box::new(PanickingDetector));
        worker.submit(frame(0, 1)).unwrap();

        let reply = worker.recv_reply_timeout(WAIT).unwrap();
        assert!(matches!(reply.result, Err(DetectError::WorkerGone)));
        assert_eq!(reply.frame.generation, 1);
        assert!(worker.try_reply().is_none());
        assert!(matches!(
            worker.submit(frame(1, 1)),
            Err(DetectError::WorkerGone)
        ));
    }

    #[test]
    fn test_try_reply_without_submit_is_none() {
        let mut worker = DetectionWorker::spawn(Box::new(FailingDetector));
        assert!(worker.try_reply().is_none());
    }
}
