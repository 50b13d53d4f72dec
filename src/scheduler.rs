//! The polling loop.
//!
//! The bus is half-duplex and the controller is its only master. Each
//! [`PollScheduler::tick`] waits a bounded time for incoming data. When the
//! wait runs out the bus is considered idle and the scheduler may send
//! something: a pending display refresh first, otherwise, once enough idle
//! ticks have passed, a weight poll to the next mat in round-robin order.
//!
//! Unanswered polls aren't retried, the mat gets its next chance when the
//! cursor comes around again.
//!
//! The decisions are made by [`PollScheduler::receive`] and
//! [`PollScheduler::on_timeout`], which don't do any I/O. `tick` only moves
//! bytes between them and a [`Transport`].

use std::io::{self, ErrorKind, Read, Write};
use std::time::Duration;

use log::{debug, info, trace};
use snafu::{ResultExt, Snafu};

use crate::buffer::Buffer;
use crate::command::{self, DisplayPage};
use crate::dispatch::{dispatch, Dispatch};
use crate::frame::{self, decode, FrameBytes, MAX_FRAME_LEN};
use crate::nom_parser::{split_frame, SplitToken};
use crate::registry::DeviceRegistry;
use crate::types::DeviceAddress;

/// Error type for this module
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Sending on the bus failed: {}", source))]
    Send { source: io::Error },
    #[snafu(display("Receiving from the bus failed: {}", source))]
    Receive { source: io::Error },
    #[snafu(display("Could not build frame: {}", source))]
    Encode { source: frame::Error },
}

/// Byte-level access to the bus.
pub trait Transport {
    /// Write a complete frame.
    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Wait at most `timeout` for data. Returns 0 if nothing arrived.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

/// [`Transport`] over any byte stream, like a `serialport::SerialPort`.
///
/// The stream's own read timeout bounds the wait, so configure it to the
/// scheduler's read timeout. Timeouts and empty reads count as "nothing
/// arrived".
#[derive(Debug)]
pub struct IoTransport<IO> {
    io: IO,
}

impl<IO> IoTransport<IO>
where
    IO: Read + Write,
{
    pub fn new(io: IO) -> Self {
        Self { io }
    }

    pub fn get_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    pub fn into_inner(self) -> IO {
        self.io
    }
}

impl<IO> Transport for IoTransport<IO>
where
    IO: Read + Write,
{
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.io.write_all(data)?;
        self.io.flush()
    }

    fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        match self.io.read(buf) {
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            other => other,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Idle ticks between two weight polls.
    pub poll_idle_ticks: u32,
    pub read_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_idle_ticks: 5,
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// A display update owed to the mat at table index `mat`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DisplayRefresh {
    pub mat: usize,
    pub page: DisplayPage,
}

/// Round-robin state of the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollCursor {
    /// Table index of the next mat to poll.
    pub index: usize,
    pub idle_ticks: u32,
    pub refresh: Option<DisplayRefresh>,
}

/// What a tick did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Data arrived and this many valid frames were dispatched.
    Received { frames: usize },
    /// Display text was sent for the mat at this index.
    Refreshed { mat: usize, page: DisplayPage },
    /// A weight poll was sent.
    Polled { mat: usize, mat_id: DeviceAddress },
    Idle,
}

#[derive(Debug)]
pub struct PollScheduler {
    config: SchedulerConfig,
    cursor: PollCursor,
    rx: Buffer,
}

impl PollScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            cursor: PollCursor::default(),
            rx: Buffer::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn cursor(&self) -> &PollCursor {
        &self.cursor
    }

    /// Something else was just sent, hold off polling.
    pub fn bus_busy(&mut self) {
        self.cursor.idle_ticks = 0;
    }

    /// Run one iteration of the loop.
    pub fn tick<T: Transport + ?Sized>(
        &mut self,
        registry: &mut DeviceRegistry,
        transport: &mut T,
    ) -> Result<Tick, Error> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = transport
            .receive(&mut buf, self.config.read_timeout)
            .context(ReceiveSnafu)?;
        if len > 0 {
            let frames = self.receive(registry, &buf[..len]);
            return Ok(Tick::Received { frames });
        }
        match self.on_timeout(registry)? {
            Some((tick, data)) => {
                transport.send(&data).context(SendSnafu)?;
                Ok(tick)
            }
            None => Ok(Tick::Idle),
        }
    }

    /// Feed received bytes. Complete frames are validated and dispatched,
    /// returns the number of valid frames.
    pub fn receive(&mut self, registry: &mut DeviceRegistry, data: &[u8]) -> usize {
        trace!("received {:02X?}", data);
        self.cursor.idle_ticks = 0;
        self.rx.write(data);
        self.drain_frames(registry)
    }

    /// Split and dispatch every complete frame in the receive buffer.
    fn drain_frames(&mut self, registry: &mut DeviceRegistry) -> usize {
        let mut frames = 0;
        loop {
            let (consumed, decoded) = match split_frame(self.rx.as_ref()) {
                (_, SplitToken::NeedData) => break,
                (consumed, SplitToken::Skip) => (consumed, None),
                (consumed, SplitToken::Candidate(bytes)) => match decode(bytes) {
                    Some(frame) => (consumed, Some(frame)),
                    // resync on the byte after the bad prefix
                    None => (1, None),
                },
            };
            self.rx.consume(consumed);
            if let Some(frame) = decoded {
                frames += 1;
                if let Dispatch::WeightUpdated { mat } = dispatch(registry, &frame) {
                    self.cursor.refresh = Some(DisplayRefresh {
                        mat,
                        page: DisplayPage::Weight,
                    });
                }
            }
        }
        frames
    }

    /// The read timed out. Returns the frame to send, if any.
    ///
    /// Bytes still waiting for the rest of a frame never get it, so the
    /// prefix they start with is dropped and the remainder searched again.
    pub fn on_timeout(
        &mut self,
        registry: &mut DeviceRegistry,
    ) -> Result<Option<(Tick, FrameBytes)>, Error> {
        if !self.rx.is_empty() {
            debug!("{} bytes of incomplete frame", self.rx.len());
            let mut recovered = 0;
            while !self.rx.is_empty() {
                self.rx.consume(1);
                recovered += self.drain_frames(registry);
            }
            if recovered > 0 {
                debug!("recovered {} frames behind line noise", recovered);
                self.cursor.idle_ticks = 0;
            }
        }
        self.cursor.idle_ticks = self.cursor.idle_ticks.saturating_add(1);

        if let Some(refresh) = self.cursor.refresh.take() {
            self.cursor.refresh = match refresh.page {
                DisplayPage::Weight => Some(DisplayRefresh {
                    page: DisplayPage::Quantity,
                    ..refresh
                }),
                DisplayPage::Quantity => None,
            };
            if let Some(mat) = registry.mat(refresh.mat) {
                if let Some(data) =
                    command::display_refresh(mat, refresh.mat, refresh.page).context(EncodeSnafu)?
                {
                    self.cursor.idle_ticks = 0;
                    return Ok(Some((
                        Tick::Refreshed {
                            mat: refresh.mat,
                            page: refresh.page,
                        },
                        data,
                    )));
                }
            }
            // no display on this mat
            self.cursor.refresh = None;
        }

        if self.cursor.idle_ticks < self.config.poll_idle_ticks {
            return Ok(None);
        }
        self.cursor.idle_ticks = 0;
        self.poll_next(registry)
    }

    fn poll_next(&mut self, registry: &DeviceRegistry) -> Result<Option<(Tick, FrameBytes)>, Error> {
        let mats = registry.mats();
        for _ in 0..mats.len() {
            let index = self.cursor.index;
            self.cursor.index = (index + 1) % mats.len();
            let mat_id = mats[index].mat_id;
            if mat_id.is_assigned() {
                info!("polling mat {} at {:#06X}", index, *mat_id);
                let data = command::poll_weight(mat_id).context(EncodeSnafu)?;
                return Ok(Some((Tick::Polled { mat: index, mat_id }, data)));
            }
        }
        Ok(None)
    }
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}
