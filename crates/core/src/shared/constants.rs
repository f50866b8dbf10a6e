use std::time::Duration;

/// Default model file looked up in the cache and bundled directories.
pub const YOLO_MODEL_NAME: &str = "yolov8n.onnx";

/// Directory name under the user's cache/config dirs.
pub const APP_DIR_NAME: &str = "LiveDetect";

pub const DEFAULT_FRAME_BUFFER_SIZE: usize = 1;

/// Sleep after a failed device read before retrying.
pub const CAPTURE_RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// How long `stop()` waits for the capture thread before detaching it.
pub const CAPTURE_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Consumer wait per `pop`.
pub const FRAME_POP_TIMEOUT: Duration = Duration::from_millis(100);

pub const DEFAULT_WINDOW_SIZE: usize = 3;
pub const DEFAULT_POSITION_TOLERANCE: f64 = 30.0;
pub const DEFAULT_CONFIDENCE_SMOOTHING: f64 = 0.8;
pub const DEFAULT_MIN_STABLE_FRAMES: usize = 2;

pub const DEFAULT_FPS_WINDOW: usize = 30;
pub const DEFAULT_DETECTION_TIME_WINDOW: usize = 100;

pub const DEFAULT_CAMERA_WIDTH: u32 = 640;
pub const DEFAULT_CAMERA_HEIGHT: u32 = 480;
pub const DEFAULT_CAMERA_FPS: u32 = 30;

/// Camera indices probed when the preferred one cannot be opened.
pub const CAMERA_PROBE_LIMIT: u32 = 6;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.4;
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.5;
pub const DEFAULT_MAX_DETECTIONS: usize = 50;

/// Box colours (RGB) handed out to labels in order of first appearance.
pub const CLASS_PALETTE: [[u8; 3]; 10] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [128, 0, 128],
    [255, 165, 0],
    [0, 128, 255],
    [128, 255, 0],
];

/// COCO class names in YOLOv8 output order.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];
