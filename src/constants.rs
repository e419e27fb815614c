// PLC I/O client
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;
pub const RECONNECT_DELAY_MS: u64 = 1000;
pub const DEFAULT_RECONNECT_COOLDOWN_MS: u64 = 5000;
pub const PLC_PING_TIMEOUT_MS: u64 = 1000;
pub const PLC_SEND_TIMEOUT_MS: u64 = 2000;
pub const PLC_RECV_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_PLC_PORT: u16 = 102;

// Encoder acquisition
pub const FRAME_LENGTH: usize = 7;
pub const FRAME_HEAD: u8 = 0x7E;
pub const FRAME_TAIL: u8 = 0x7F;
pub const NUM_COLLECTORS: usize = 2;
pub const CHANNELS_PER_COLLECTOR: usize = 10;
pub const DEFAULT_COLLECTOR_PORT: u16 = 5000;
pub const DATA_TIMEOUT_MS: u64 = 500;
pub const ENCODER_RECV_TIMEOUT_MS: u64 = 300;

// 17 bits of sub-turn position
pub const ENCODER_POSITION_BITS: u32 = 17;
pub const ENCODER_POSITION_MASK: u32 = (1 << ENCODER_POSITION_BITS) - 1;
pub const ENCODER_TURNS_MASK: u32 = 0x7FFF;
pub const ENCODER_COMBINED_SCALE: f64 = 1e6;

// Connection supervisor
pub const SUPERVISOR_PERIOD_MS: u64 = 500;
pub const SUPERVISOR_PING_TIMEOUT_MS: u64 = 300;
pub const SUPERVISOR_CONNECT_TIMEOUT_MS: u64 = 500;
pub const MIN_PROXY_RECONNECT_INTERVAL_SEC: u64 = 1;
pub const MAX_RESTORE_RETRIES: u32 = 3;

// Motion
pub const NUM_PLATFORM_AXES: usize = 3;
pub const NUM_MOTION_AXES: usize = 2 * NUM_PLATFORM_AXES;
pub const DEFAULT_MAX_VELOCITY: f64 = 100.0;
pub const TRAJECTORY_SAMPLE_STEP: f64 = 0.1;
pub const IN_POSITION_TOLERANCE: f64 = 0.01;

// Device server
pub const LOCAL_HOST: &str = "127.0.0.1";
pub const ALL_HOST: &str = "0.0.0.0";
pub const TERMINATOR: &[u8; 2] = b"\r\n";
pub const BOUND_SYNC_CHANNEL: usize = 100;
pub const DEVICE_LOOP_TIME_MS: u64 = 100;
pub const SERVER_TIMEOUT_MS: u64 = 50;

// Reflection logs kept in memory for the export
pub const MAX_LOG_HISTORY: usize = 1000;

// Collaborator proxies
pub const PROXY_CALL_TIMEOUT_MS: u64 = 3000;
