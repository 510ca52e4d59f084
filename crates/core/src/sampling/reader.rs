//! Batched sample readback
//!
//! Requests made during a tick reserve texels in one packed batch. On
//! [`AsyncSampler::update`] the batch is submitted as a single readback job
//! and, once it resolves, each owner receives its decoded sample. Only one
//! batch is ever in flight; while it is, the sampler is not
//! [`ready`](AsyncSampler::is_ready) and new requests wait for the next batch.
//!
//! In [`ReadbackMode::Async`] the job runs on the rayon pool. The first poll
//! never blocks; the second one waits, so results always arrive by the
//! tick after submission.

use super::sample::{evaluate_texels, FluidSample, SampleHandler, SampleTexels, TEXELS_PER_SAMPLE};
use crate::core_types::{Rgba, Vec3};
use crate::grid::{GridGeometry, GridSnapshot};
use crate::simulation::FluidSimulation;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};

/// Default number of texels in a batch
pub const DEFAULT_BATCH_WIDTH: usize = 1024;

/// How batches are read back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadbackMode {
    /// Evaluate on a worker and deliver on a later poll
    #[default]
    Async,
    /// Evaluate and deliver inside `update`
    Blocking,
}

/// One queued sample: what to read and where to write it in the batch
struct SampleJob {
    geometry: GridGeometry,
    snapshot: Arc<GridSnapshot>,
    position: Vec3,
    max_speed: f32,
    first_texel: usize,
}

/// Receiver of one queued sample
struct PendingOwner {
    owner: Weak<Mutex<dyn SampleHandler>>,
    first_texel: usize,
    overlap: f32,
}

/// Batch submitted to the readback job
struct InFlight {
    jobs: Arc<Vec<SampleJob>>,
    owners: Vec<PendingOwner>,
    receiver: Option<Receiver<Vec<Rgba>>>,
    polls: u32,
}

/// Evaluate every job of a batch into a packed texel row
fn read_batch(jobs: &[SampleJob], width: usize) -> Vec<Rgba> {
    let mut texels = vec![[0.0; 4]; width];
    for job in jobs {
        let packed = evaluate_texels(&job.geometry, &job.snapshot, &job.position, job.max_speed);
        texels[job.first_texel..job.first_texel + TEXELS_PER_SAMPLE].copy_from_slice(&packed);
    }
    texels
}

/// Batches point queries and delivers them to their owners
pub struct AsyncSampler {
    width: usize,
    mode: ReadbackMode,
    added_jobs: Vec<SampleJob>,
    added_owners: Vec<PendingOwner>,
    next_texel: usize,
    in_flight: Option<InFlight>,
    delivered: u64,
}

impl std::fmt::Debug for AsyncSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSampler")
            .field("width", &self.width)
            .field("mode", &self.mode)
            .field("queued", &self.added_jobs.len())
            .field("in_flight", &self.in_flight.is_some())
            .field("delivered", &self.delivered)
            .finish()
    }
}

impl Default for AsyncSampler {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_WIDTH, ReadbackMode::default())
    }
}

impl AsyncSampler {
    /// Sampler with a batch of `width` texels
    #[must_use]
    pub fn new(width: usize, mode: ReadbackMode) -> Self {
        Self {
            width,
            mode,
            added_jobs: Vec::new(),
            added_owners: Vec::new(),
            next_texel: 0,
            in_flight: None,
            delivered: 0,
        }
    }

    /// Whether no batch is in flight
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.in_flight.is_none()
    }

    /// Requests queued for the next batch
    #[must_use]
    pub fn queued(&self) -> usize {
        self.added_jobs.len()
    }

    /// Samples delivered since creation
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn mode(&self) -> ReadbackMode {
        self.mode
    }

    /// Queue a sample of `simulation` at `position` for `owner`
    ///
    /// # Arguments
    ///
    /// * `simulation` - Simulation to read; must be activated
    /// * `position` - World position
    /// * `owner` - Receives the sample when the batch resolves
    ///
    /// # Returns
    ///
    /// `false` when the simulation is inactive or the batch is full
    pub fn request_sample<H: SampleHandler + 'static>(
        &mut self,
        simulation: &FluidSimulation,
        position: Vec3,
        owner: &Arc<Mutex<H>>,
    ) -> bool {
        let (Some(geometry), Some(snapshot)) = (simulation.geometry(), simulation.snapshot()) else {
            return false;
        };
        if self.next_texel + TEXELS_PER_SAMPLE > self.width {
            debug!(width = self.width, "Sample batch full, request refused");
            return false;
        }

        let owner: Arc<Mutex<dyn SampleHandler>> = owner.clone();
        let first_texel = self.next_texel;
        self.next_texel += TEXELS_PER_SAMPLE;
        self.added_jobs.push(SampleJob {
            geometry: geometry.clone(),
            snapshot,
            position,
            max_speed: simulation.config().speed,
            first_texel,
        });
        self.added_owners.push(PendingOwner {
            owner: Arc::downgrade(&owner),
            first_texel,
            overlap: simulation.overlap_xz_radius(&position, 0.0),
        });
        true
    }

    /// Submit queued requests and deliver finished batches
    ///
    /// # Returns
    ///
    /// Number of samples delivered by this call
    pub fn update(&mut self) -> usize {
        if self.in_flight.is_none() && !self.added_jobs.is_empty() {
            self.submit();
        }
        self.poll()
    }

    fn submit(&mut self) {
        let jobs = Arc::new(std::mem::take(&mut self.added_jobs));
        let owners = std::mem::take(&mut self.added_owners);
        self.next_texel = 0;
        debug!(samples = jobs.len(), mode = ?self.mode, "Submitting sample batch");

        let receiver = match self.mode {
            ReadbackMode::Async => {
                let (sender, receiver) = mpsc::channel();
                let worker_jobs = Arc::clone(&jobs);
                let width = self.width;
                rayon::spawn(move || {
                    let _ = sender.send(read_batch(&worker_jobs, width));
                });
                Some(receiver)
            }
            ReadbackMode::Blocking => None,
        };
        self.in_flight = Some(InFlight {
            jobs,
            owners,
            receiver,
            polls: 0,
        });
    }

    fn poll(&mut self) -> usize {
        let Some(flight) = self.in_flight.as_mut() else {
            return 0;
        };
        flight.polls += 1;

        let texels = match &flight.receiver {
            None => read_batch(&flight.jobs, self.width),
            Some(receiver) => {
                let received = if flight.polls < 2 {
                    match receiver.try_recv() {
                        Ok(texels) => Some(texels),
                        Err(TryRecvError::Empty) => return 0,
                        Err(TryRecvError::Disconnected) => None,
                    }
                } else {
                    receiver.recv().ok()
                };
                match received {
                    Some(texels) => texels,
                    None => {
                        warn!("Sample worker disconnected, reading batch synchronously");
                        read_batch(&flight.jobs, self.width)
                    }
                }
            }
        };

        let Some(flight) = self.in_flight.take() else {
            return 0;
        };
        let mut delivered = 0;
        for pending in flight.owners {
            let Some(owner) = pending.owner.upgrade() else {
                continue;
            };
            let mut packed: SampleTexels = [[0.0; 4]; TEXELS_PER_SAMPLE];
            let first = pending.first_texel;
            packed.copy_from_slice(&texels[first..first + TEXELS_PER_SAMPLE]);
            let sample = FluidSample::from_texels(&packed, pending.overlap);
            match owner.lock() {
                Ok(mut handler) => {
                    handler.handle_sample(&sample);
                    delivered += 1;
                }
                Err(_) => warn!("Sample owner lock poisoned, skipping delivery"),
            };
        }
        self.delivered += delivered as u64;
        delivered
    }
}
