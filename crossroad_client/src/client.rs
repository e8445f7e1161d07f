//! Client implementation.
//!
//! `SimulationClient` is the single owner of all session state:
//! - The protocol state machine and its active flag
//! - Signal and vehicle registries
//! - Per-step intents and the step countdown
//! - The scene the registries are mirrored into
//!
//! Requests run as spawned tasks and report back over a channel. Their
//! results are applied only from [`SimulationClient::poll_responses`] and
//! friends, on the same context that calls [`SimulationClient::advance`], so
//! no state is ever shared across tasks.

use std::sync::Arc;

use crossroad_shared::{
    config::ClientConfig,
    error::{ProtocolViolation, TransportError},
    net::BoardInit,
    render::{BoardSetup, SceneBackend},
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    interp::Scheduler,
    protocol::{Outcome, ProtocolMachine, ProtocolState, Routed, Ticket},
    reconcile::Reconciler,
    transport::Transport,
};

/// A finished request.
#[derive(Debug)]
struct Completion {
    ticket: Ticket,
    result: Result<String, TransportError>,
}

/// Point-in-time summary for logs and status output.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationStatus {
    pub state: ProtocolState,
    pub active: bool,
    pub board: Option<BoardInit>,
    pub steps_applied: u64,
    pub signals: usize,
    pub vehicles: usize,
    pub moves: usize,
    pub turns: usize,
    pub progress: f32,
}

/// Step synchronisation and interpolation engine.
pub struct SimulationClient<S> {
    machine: ProtocolMachine,
    reconciler: Reconciler,
    scheduler: Scheduler,
    scene: S,
    board: Option<BoardInit>,
    steps_applied: u64,

    transport: Arc<dyn Transport>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl<S: SceneBackend + BoardSetup> SimulationClient<S> {
    pub fn new(step_duration: f32, transport: Arc<dyn Transport>, scene: S) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            machine: ProtocolMachine::new(),
            reconciler: Reconciler::new(),
            scheduler: Scheduler::new(step_duration),
            scene,
            board: None,
            steps_applied: 0,
            transport,
            completions_tx,
            completions_rx,
        }
    }

    pub fn from_config(cfg: &ClientConfig, transport: Arc<dyn Transport>, scene: S) -> Self {
        Self::new(cfg.step_duration(), transport, scene)
    }

    /// Sends `board-init`. Must be called inside a tokio runtime.
    pub fn start(&mut self) {
        if let Some(ticket) = self.machine.start() {
            info!("Requesting board");
            self.dispatch(ticket);
        }
    }

    fn dispatch(&self, ticket: Ticket) {
        let transport = Arc::clone(&self.transport);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = transport.send(ticket.request.as_str()).await;
            // The receiver lives as long as the client; a send error only
            // means the client is gone.
            let _ = tx.send(Completion { ticket, result });
        });
    }

    /// Applies every completed request without waiting. Returns how many were
    /// applied.
    pub fn poll_responses(&mut self) -> Result<usize, ProtocolViolation> {
        let mut handled = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.handle(completion)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Waits for the in-flight request, if any, and applies it. Returns false
    /// when nothing was in flight.
    pub async fn next_response(&mut self) -> Result<bool, ProtocolViolation> {
        if self.machine.in_flight().is_none() {
            return Ok(false);
        }
        match self.completions_rx.recv().await {
            Some(completion) => {
                self.handle(completion)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn handle(&mut self, completion: Completion) -> Result<(), ProtocolViolation> {
        let was_paused = self.machine.state() == ProtocolState::Paused;
        let Outcome { routed, next } = self.machine.complete(completion.ticket, completion.result)?;

        // A resumed session starts on a fresh step.
        if !was_paused && self.machine.state() == ProtocolState::Paused {
            self.scheduler.reset();
        }

        if let Err(violation) = self.route(routed) {
            self.machine.halt(&violation);
            return Err(violation);
        }

        if let Some(ticket) = next {
            debug!(request = %ticket.request, "Requesting");
            self.dispatch(ticket);
        }
        Ok(())
    }

    fn route(&mut self, routed: Routed) -> Result<(), ProtocolViolation> {
        match routed {
            Routed::Board(board) => {
                self.board = Some(board);
                self.scene.configure_board(board.m, board.n);
            }
            Routed::Lights(lights) => {
                self.reconciler.apply_light_init(&lights, &mut self.scene)?;
            }
            Routed::Step { cars, lights } => {
                self.reconciler.apply_light_step(&lights, &mut self.scene)?;
                let intents = self.reconciler.apply_vehicle_steps(&cars, &mut self.scene)?;
                self.scheduler.enqueue(intents);
                self.steps_applied += 1;
            }
            Routed::Nothing => {}
        }
        Ok(())
    }

    /// One render/update tick of `dt` seconds. Does nothing while inactive.
    pub fn advance(&mut self, dt: f32) {
        if !self.machine.is_active() {
            return;
        }
        let boundary = self
            .scheduler
            .advance(dt, &mut self.reconciler, &mut self.scene);
        if boundary {
            if let Some(ticket) = self.machine.on_step_boundary() {
                self.dispatch(ticket);
            }
        }
    }

    /// Leaves a server-ordered pause. Returns whether the engine resumed.
    pub fn resume(&mut self) -> bool {
        self.machine.resume()
    }

    pub fn shutdown(&mut self) {
        self.machine.shutdown();
        self.scheduler.reset();
    }

    pub fn state(&self) -> ProtocolState {
        self.machine.state()
    }

    pub fn is_active(&self) -> bool {
        self.machine.is_active()
    }

    pub fn board(&self) -> Option<BoardInit> {
        self.board
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn machine(&self) -> &ProtocolMachine {
        &self.machine
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn status(&self) -> SimulationStatus {
        SimulationStatus {
            state: self.machine.state(),
            active: self.machine.is_active(),
            board: self.board,
            steps_applied: self.steps_applied,
            signals: self.reconciler.signal_count(),
            vehicles: self.reconciler.vehicle_count(),
            moves: self.scheduler.moves().len(),
            turns: self.scheduler.turns().len(),
            progress: self.scheduler.timer().progress(),
        }
    }
}
