//! Live object detection: a drop-oldest capture pipeline, temporal
//! stabilization of detections, and a shared lifecycle/metrics store.

pub mod capture {
    pub mod capture_loop;
    pub mod domain {
        pub mod frame_source;
    }
    pub mod frame_channel;
    pub mod infrastructure;
    pub mod source_probe;
}

pub mod detection {
    pub mod domain {
        pub mod detection_window;
        pub mod object_detector;
        pub mod stabilizer;
    }
    pub mod infrastructure;
}

pub mod rendering {
    pub mod domain {
        pub mod render_sink;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod control;
    pub mod infrastructure;
    pub mod live_detection_use_case;
    pub mod performance_metrics;
    pub mod pipeline_logger;
    pub mod state_store;
}

pub mod shared {
    pub mod constants;
    pub mod detection;
    pub mod frame;
    pub mod moving_average;
    pub mod settings;
}
