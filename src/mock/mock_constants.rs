// Size of each memory area of the mock PLC in bytes
pub const MOCK_PLC_AREA_SIZE: usize = 1024;

// Call timeout of the mock handles in milliseconds
pub const MOCK_DEFAULT_TIMEOUT_MS: u64 = 3000;

// Mock controller reports no active limit switch with the low-active wiring
pub const MOCK_EL_NO_LIMIT: i16 = 1;

// Axes of the mock motion controller, the platform axes plus the auxiliary ones
pub const MOCK_NUM_AXES: usize = 8;

// Bytes of the image captured by the mock camera
pub const MOCK_IMAGE_SIZE: usize = 64;
