use std::mem;
use std::time::Duration;

/// The default capture sample rate in Hz
pub(crate) const DEFAULT_SAMPLE_RATE: u32 = 48_000;
/// The only supported sample depth, frame math assumes 16-bit samples
pub(crate) const DEFAULT_SAMPLE_BITS: u8 = 16;
/// Mono capture
pub(crate) const DEFAULT_CHANNELS: u8 = 1;
/// 10ms at the default sample rate
pub(crate) const DEFAULT_FRAME_SIZE: u16 = 480;
/// The number of bytes in one sample
pub(crate) const SAMPLE_BYTES: usize = mem::size_of::<i16>();
/// How long the consumer waits on an empty queue before giving up for this cycle
pub(crate) const POLL_TIMEOUT: Duration = Duration::from_millis(1);
/// The initial capacity of the byte accumulator
pub(crate) const ACCUMULATOR_CAPACITY: usize = 4_096;
/// Multiples of the nominal frame size offered by the built-in codecs
pub(crate) const FRAME_MULTIPLIERS: [usize; 3] = [1, 2, 4];
/// The residual bits used by the SEA codec until a bitrate is set
pub(crate) const SEA_RESIDUAL_BITS: f32 = 3_f32;
/// The number of frames sharing one scale factor in SEA chunks
pub(crate) const SEA_SCALE_FACTOR_FRAMES: u8 = 20;
/// the number of encoded frames the pump can hold before the transport reads them
pub(crate) const PUMP_CHANNEL_SIZE: usize = 64;
