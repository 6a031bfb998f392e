pub mod detection_loop;
pub mod frame_clock;
pub mod live_view;
pub mod loop_logger;
