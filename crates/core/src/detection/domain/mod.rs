pub mod arbitration;
pub mod candidate;
pub mod detection_pass;
pub mod detector_registry;
pub mod region_detector;
pub mod sensitivity;
