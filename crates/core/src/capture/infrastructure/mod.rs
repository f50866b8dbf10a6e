pub mod ffmpeg_frame_source;
pub mod synthetic_frame_source;
