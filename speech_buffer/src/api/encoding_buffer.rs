use std::collections::VecDeque;

use bytes::Bytes;
use kanal::{unbounded, Receiver, Sender};
use log::debug;

use crate::api::accumulator::ByteAccumulator;
use crate::api::codec::{CodecKind, CodecProvider, CodecSet};
use crate::api::constants::{ACCUMULATOR_CAPACITY, POLL_TIMEOUT, SAMPLE_BYTES};
use crate::api::error::{ErrorKind, Result};
use crate::api::items::{EncodedSpeech, EncodingConfig, Speech, SpeechTarget, Submission};

/// A cloneable handle for submitting speech to an [`EncodingBuffer`] from other threads
#[derive(Clone)]
pub struct SpeechSender {
    sender: Sender<Submission>,
}

impl SpeechSender {
    /// Queues raw 16-bit PCM for `target`, never blocks
    pub fn add(&self, pcm: impl Into<Bytes>, target: SpeechTarget, target_id: u32) -> Result<()> {
        self.sender.send(Submission::Speech(Speech {
            pcm: pcm.into(),
            target,
            target_id,
        }))?;

        Ok(())
    }

    /// Marks the end of the current utterance
    pub fn stop(&self) -> Result<()> {
        self.sender.send(Submission::Stop)?;
        Ok(())
    }
}

/// Re-chunks submitted PCM into codec sized frames
///
/// Any number of producers submit PCM through [`EncodingBuffer::add`] or a
/// [`SpeechSender`]; a single consumer calls [`EncodingBuffer::encode`] once
/// per output tick. Bytes for one destination are never mixed into a frame
/// with bytes for another: when the destination changes, the new speech waits
/// until everything recorded for the previous destination has been emitted.
pub struct EncodingBuffer<P: CodecProvider = CodecSet> {
    sender: SpeechSender,
    receiver: Receiver<Submission>,
    codecs: P,
    accumulator: ByteAccumulator,
    /// the destination of the bytes in the accumulator
    target: SpeechTarget,
    target_id: u32,
    /// speech pulled from the queue that is waiting for the accumulator to drain, oldest first
    pending: VecDeque<Speech>,
    /// a stop was consumed and the accumulator still holds the end of that utterance
    flushing: bool,
    /// stops consumed since creation
    stops: u64,
}

impl EncodingBuffer<CodecSet> {
    /// An encoding buffer using the built-in codecs
    pub fn new(config: EncodingConfig) -> Result<Self> {
        Ok(Self::with_provider(CodecSet::new(config)?))
    }
}

impl<P: CodecProvider> EncodingBuffer<P> {
    pub fn with_provider(codecs: P) -> Self {
        let (sender, receiver) = unbounded();

        Self {
            sender: SpeechSender { sender },
            receiver,
            codecs,
            accumulator: ByteAccumulator::with_capacity(ACCUMULATOR_CAPACITY),
            target: SpeechTarget::default(),
            target_id: 0,
            pending: VecDeque::new(),
            flushing: false,
            stops: 0,
        }
    }

    /// Queues raw 16-bit PCM for `target`, never blocks
    pub fn add(&self, pcm: impl Into<Bytes>, target: SpeechTarget, target_id: u32) -> Result<()> {
        self.sender.add(pcm, target, target_id)
    }

    /// Marks the end of the current utterance
    pub fn stop(&self) -> Result<()> {
        self.sender.stop()
    }

    pub fn sender(&self) -> SpeechSender {
        self.sender.clone()
    }

    pub fn codecs(&self) -> &P {
        &self.codecs
    }

    pub fn codecs_mut(&mut self) -> &mut P {
        &mut self.codecs
    }

    /// The bitrate of the active codec, 0 before any codec has been used
    pub fn bitrate(&self) -> i32 {
        self.codecs.bitrate()
    }

    pub fn set_bitrate(&mut self, bitrate: i32) {
        self.codecs.set_bitrate(bitrate);
    }

    /// True when nothing is queued, pending or accumulated
    pub fn is_idle(&self) -> bool {
        self.receiver.is_empty() && self.pending.is_empty() && self.accumulator.is_empty()
    }

    /// Submissions queued or pending that have not reached the accumulator
    pub fn backlog(&self) -> usize {
        self.receiver.len() + self.pending.len()
    }

    pub fn stops_consumed(&self) -> u64 {
        self.stops
    }

    /// True while the end of an utterance is still being emitted
    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    /// Runs one encode cycle
    ///
    /// Pulls as much queued speech as fits the largest frame of `kind` and
    /// encodes at most one frame. Returns `None` when there is not enough
    /// data for a frame yet. After a stop the remaining bytes are padded with
    /// silence up to the smallest frame that holds them.
    pub fn encode(&mut self, kind: CodecKind) -> Result<Option<EncodedSpeech>> {
        let frame_sizes: Vec<usize> = self
            .codecs
            .codec(kind)?
            .permitted_frame_sizes()
            .iter()
            .map(|size| size * SAMPLE_BYTES)
            .collect();

        let Some(&max_bytes) = frame_sizes.last() else {
            return Err(ErrorKind::NoFrameSizes(kind).into());
        };

        // frame selection relies on strictly ascending non-zero sizes
        if frame_sizes.contains(&0) || frame_sizes.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ErrorKind::InvalidFrameSizes(kind).into());
        }

        self.accumulate(max_bytes)?;

        if self.accumulator.is_empty() {
            self.flushing = false;
            return Ok(None);
        }

        let Some(frame_bytes) =
            select_frame_bytes(&frame_sizes, self.accumulator.count(), self.flushing)
        else {
            return Ok(None);
        };

        // the unread tail stays zeroed, which pads a final frame with silence
        let mut frame = vec![0_u8; frame_bytes];
        let read = self.accumulator.read(&mut frame);

        if self.flushing && read < frame_bytes {
            debug!(
                "padded final frame for {:?}/{} with {} bytes of silence",
                self.target,
                self.target_id,
                frame_bytes - read
            );
        }

        if self.accumulator.is_empty() {
            self.flushing = false;
        }

        let encoded = self.codecs.codec(kind)?.encode(&frame)?;

        Ok(Some(EncodedSpeech {
            encoded,
            target: self.target,
            target_id: self.target_id,
        }))
    }

    /// fills the accumulator up to `max_bytes` from the pending speech and then the queue
    fn accumulate(&mut self, max_bytes: usize) -> Result<()> {
        if self.flushing {
            return Ok(());
        }

        while self.accumulator.count() < max_bytes {
            let speech = match self.pending.front() {
                Some(speech) if !self.can_merge(speech) => break,
                Some(_) => self.pending.pop_front(),
                None => match self.receiver.recv_timeout(POLL_TIMEOUT) {
                    Ok(Submission::Speech(speech)) => Some(speech),
                    Ok(Submission::Stop) => {
                        debug!("stop received for {:?}/{}", self.target, self.target_id);
                        self.flushing = true;
                        self.stops += 1;
                        return Ok(());
                    }
                    // nothing queued right now
                    Err(_) => None,
                },
            };

            let Some(speech) = speech else {
                break;
            };

            if self.can_merge(&speech) {
                self.merge(speech)?;
            } else {
                debug!(
                    "target changed from {:?}/{} to {:?}/{}, deferring",
                    self.target, self.target_id, speech.target, speech.target_id
                );
                self.pending.push_back(speech);
                break;
            }
        }

        let blocked = self
            .pending
            .front()
            .is_some_and(|speech| !self.can_merge(speech));

        if blocked && self.accumulator.count() < max_bytes {
            self.scan_for_stop();
        }

        Ok(())
    }

    /// Drains what is already queued behind blocked pending speech looking for a stop
    ///
    /// The remainder for the previous destination can only be flushed by a
    /// stop, which may sit behind speech for the new destination. Speech found
    /// on the way keeps its order behind the pending head. Submissions arriving
    /// during the scan are left for the next cycle.
    fn scan_for_stop(&mut self) {
        for _ in 0..self.receiver.len() {
            let Ok(Some(submission)) = self.receiver.try_recv() else {
                break;
            };

            match submission {
                Submission::Speech(speech) => self.pending.push_back(speech),
                Submission::Stop => {
                    debug!(
                        "stop received behind {} pending submissions",
                        self.pending.len()
                    );
                    self.flushing = true;
                    self.stops += 1;
                    break;
                }
            }
        }
    }

    /// speech merges when the accumulator is empty or already holds bytes for the same destination
    fn can_merge(&self, speech: &Speech) -> bool {
        self.accumulator.is_empty() || speech.label() == (self.target, self.target_id)
    }

    fn merge(&mut self, speech: Speech) -> Result<()> {
        self.accumulator.write(&speech.pcm)?;
        self.target = speech.target;
        self.target_id = speech.target_id;
        Ok(())
    }
}

/// Picks the frame size in bytes for `available` accumulated bytes
///
/// `frame_sizes` must be ascending. Normally the largest frame that can be
/// filled is used. When flushing, the smallest frame holding every remaining
/// byte is used; if none is large enough the largest frame is emitted and the
/// rest is flushed on the following cycles.
fn select_frame_bytes(frame_sizes: &[usize], available: usize, flushing: bool) -> Option<usize> {
    if flushing {
        frame_sizes
            .iter()
            .copied()
            .find(|&size| size >= available)
            .or_else(|| frame_sizes.last().copied())
    } else {
        frame_sizes
            .iter()
            .copied()
            .rev()
            .find(|&size| size <= available)
    }
}
