pub mod cascade_detector;
pub mod haar_cascade;
pub mod opencv_cascade_xml;
pub mod registry_config;
pub mod registry_factory;
