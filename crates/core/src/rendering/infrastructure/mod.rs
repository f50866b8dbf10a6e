pub mod box_annotator;
pub mod class_palette;
pub mod composite_render_sink;
pub mod frame_recorder_sink;
pub mod log_render_sink;
