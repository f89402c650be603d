use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use kanal::{bounded, Receiver, Sender};
use log::{error, info};
use parking_lot::Mutex;

use crate::api::codec::{CodecKind, CodecProvider};
use crate::api::constants::PUMP_CHANNEL_SIZE;
use crate::api::encoding_buffer::EncodingBuffer;
use crate::api::error::{ErrorKind, Result};
use crate::api::items::EncodedSpeech;

#[derive(Default)]
struct PumpState {
    /// cleared to end the pump
    running: AtomicBool,
    /// flush everything buffered before exiting
    drain: AtomicBool,
}

/// Drives an [`EncodingBuffer`] from a dedicated thread
///
/// Encoded frames are delivered on the receiver returned by [`EncoderPump::spawn`].
/// The buffer stays shared so the session can keep adjusting it, e.g. the bitrate.
pub struct EncoderPump {
    state: Arc<PumpState>,
    handle: JoinHandle<Result<()>>,
}

impl EncoderPump {
    /// Starts encoding with `kind`, sleeping `tick` whenever no frame is ready
    pub fn spawn<P>(
        buffer: Arc<Mutex<EncodingBuffer<P>>>,
        kind: CodecKind,
        tick: Duration,
    ) -> (Self, Receiver<EncodedSpeech>)
    where
        P: CodecProvider + 'static,
    {
        let (sender, receiver) = bounded(PUMP_CHANNEL_SIZE);

        let state = Arc::new(PumpState::default());
        state.running.store(true, Relaxed);

        let state_clone = Arc::clone(&state);
        let handle = thread::spawn(move || pump(buffer, kind, tick, sender, state_clone));

        (Self { state, handle }, receiver)
    }

    /// Stops after the current cycle, anything still buffered stays in the buffer
    pub fn stop(&self) {
        self.state.running.store(false, Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the pump and waits for it
    pub fn join(self) -> Result<()> {
        self.stop();
        self.handle.join().map_err(|_| ErrorKind::PumpPanicked)?
    }

    /// Flushes every buffered utterance, padding the last frame of each, then stops
    ///
    /// Only speech submitted before the drain starts is guaranteed to be
    /// flushed. Speech added afterwards may be left in the buffer, and may be
    /// cut short by stops the drain queued but did not need.
    pub fn finish(self) -> Result<()> {
        self.state.drain.store(true, Relaxed);
        self.join()
    }
}

fn pump<P: CodecProvider>(
    buffer: Arc<Mutex<EncodingBuffer<P>>>,
    kind: CodecKind,
    tick: Duration,
    sender: Sender<EncodedSpeech>,
    state: Arc<PumpState>,
) -> Result<()> {
    // the stop count at which everything submitted before the drain is flushed
    let mut drained_at = None;

    loop {
        let running = state.running.load(Relaxed);

        if !running && !state.drain.load(Relaxed) {
            break;
        }

        let mut guard = buffer.lock();

        if !running {
            match drained_at {
                None => {
                    // each submission may start a new destination, plus the one accumulating
                    let stops = guard.backlog() as u64 + 1;

                    for _ in 0..stops {
                        guard.stop()?;
                    }

                    drained_at = Some(guard.stops_consumed() + stops);
                }
                Some(target) if guard.stops_consumed() >= target && !guard.is_flushing() => break,
                Some(_) => (),
            }
        }

        let output = guard.encode(kind);

        match output {
            Ok(Some(speech)) => {
                drop(guard);

                if sender.send(speech).is_err() {
                    info!("encoded speech receiver closed, pump exiting");
                    break;
                }
            }
            Ok(None) if running => {
                drop(guard);
                thread::sleep(tick);
            }
            // the queued stops keep the drain moving
            Ok(None) => (),
            Err(error) => {
                error!("encoder pump stopped: {}", error);
                return Err(error);
            }
        }
    }

    info!("encoder pump finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::codec::{CodecSet, PcmCodec};
    use crate::api::items::{EncodingConfig, SpeechTarget};
    use crate::api::logger::init_logger;
    use log::LevelFilter;
    use std::time::Instant;

    const TICK: Duration = Duration::from_millis(2);

    fn shared_buffer() -> Arc<Mutex<EncodingBuffer>> {
        init_logger(LevelFilter::Debug, Some("tests.log"));

        let mut codecs = CodecSet::empty(EncodingConfig::default()).unwrap();
        codecs.register(CodecKind::Pcm, |config| {
            Ok(Box::new(PcmCodec::with_frame_sizes(config, vec![240])))
        });

        Arc::new(Mutex::new(EncodingBuffer::with_provider(codecs)))
    }

    fn collect(receiver: &Receiver<EncodedSpeech>) -> Vec<EncodedSpeech> {
        let mut frames = Vec::new();

        while let Ok(Some(frame)) = receiver.try_recv() {
            frames.push(frame);
        }

        frames
    }

    #[test]
    fn test_finish_flushes_every_destination() {
        let buffer = shared_buffer();
        let sender = buffer.lock().sender();

        sender.add(vec![1; 1_000], SpeechTarget::Normal, 1).unwrap();
        sender.add(vec![2; 100], SpeechTarget::Whisper, 2).unwrap();

        let (pump, receiver) = EncoderPump::spawn(Arc::clone(&buffer), CodecKind::Pcm, TICK);
        pump.finish().unwrap();

        let frames = collect(&receiver);
        let labels: Vec<_> = frames
            .iter()
            .map(|frame| (frame.target, frame.target_id))
            .collect();

        assert_eq!(
            labels,
            vec![
                (SpeechTarget::Normal, 1),
                (SpeechTarget::Normal, 1),
                (SpeechTarget::Normal, 1),
                (SpeechTarget::Whisper, 2),
            ]
        );

        assert!(frames.iter().all(|frame| frame.encoded.len() == 480));
        assert!(frames[2].encoded[40..].iter().all(|&byte| byte == 0));
        assert!(buffer.lock().is_idle());
    }

    #[test]
    fn test_frames_while_running() {
        let buffer = shared_buffer();
        let sender = buffer.lock().sender();

        let (pump, receiver) = EncoderPump::spawn(Arc::clone(&buffer), CodecKind::Pcm, TICK);

        for _ in 0..5 {
            sender.add(vec![7; 480], SpeechTarget::Shout, 0).unwrap();
        }

        for _ in 0..5 {
            let frame = receiver.recv().unwrap();
            assert_eq!(frame.target, SpeechTarget::Shout);
            assert_eq!(&frame.encoded[..], &[7; 480][..]);
        }

        pump.join().unwrap();
    }

    #[test]
    fn test_stop_leaves_buffered_speech() {
        let buffer = shared_buffer();
        buffer
            .lock()
            .add(vec![3; 100], SpeechTarget::Normal, 0)
            .unwrap();

        let (pump, _receiver) = EncoderPump::spawn(Arc::clone(&buffer), CodecKind::Pcm, TICK);
        pump.stop();
        pump.join().unwrap();

        // too short for a frame and no stop was sent
        assert!(!buffer.lock().is_idle());
    }

    #[test]
    fn test_finish_with_busy_producer() {
        let buffer = shared_buffer();
        let sender = buffer.lock().sender();

        sender.add(vec![4; 100], SpeechTarget::Normal, 1).unwrap();

        let (pump, receiver) = EncoderPump::spawn(Arc::clone(&buffer), CodecKind::Pcm, TICK);
        let consumer = thread::spawn(move || {
            let mut frames = Vec::new();

            while let Ok(frame) = receiver.recv() {
                frames.push(frame);
            }

            frames
        });

        let running = Arc::new(AtomicBool::new(true));
        let producer = thread::spawn({
            let running = Arc::clone(&running);

            move || {
                // gives up eventually so a stuck drain fails instead of hanging
                let deadline = Instant::now() + Duration::from_secs(5);

                while running.load(Relaxed) && Instant::now() < deadline {
                    sender.add(vec![6; 16], SpeechTarget::Normal, 1).unwrap();
                    thread::sleep(Duration::from_micros(100));
                }
            }
        });

        thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        pump.finish().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));

        running.store(false, Relaxed);
        producer.join().unwrap();

        let frames = consumer.join().unwrap();
        assert!(!frames.is_empty());
        assert_eq!(&frames[0].encoded[..100], &[4; 100][..]);
        assert!(frames.iter().all(|frame| frame.encoded.len() == 480));
    }

    #[test]
    fn test_codec_error_ends_pump() {
        let buffer = Arc::new(Mutex::new(
            EncodingBuffer::new(EncodingConfig::default()).unwrap(),
        ));

        let (pump, _receiver) = EncoderPump::spawn(buffer, CodecKind::Opus, TICK);

        // the error has to end the pump on its own
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !pump.is_finished() {
            assert!(std::time::Instant::now() < deadline, "pump kept running");
            thread::sleep(TICK);
        }

        let error = pump.join().unwrap_err();
        assert!(matches!(
            error.kind,
            ErrorKind::UnsupportedCodec(CodecKind::Opus)
        ));
    }
}
