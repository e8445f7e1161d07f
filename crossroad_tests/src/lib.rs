//! Test harness for the crossroad client.
//!
//! - [`StubServer`]: axum endpoint on an ephemeral port that hands every
//!   POSTed request name to a handler.
//! - [`Replay`]: scripted simulation server answering `board-init`,
//!   `lights-init` and `step` the way the live simulation does.

use std::{
    collections::VecDeque,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex},
};

use anyhow::Context;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use crossroad_shared::net::{
    BoardInit, CarStep, ControlOrder, Items, LightInit, LightStep, RequestBody, StepResponse,
    VehicleId,
};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{debug, warn};

/// HTTP answer produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

/// Request handler run for every POST, in arrival order.
pub type Handler = Box<dyn FnMut(&str) -> Reply + Send>;

type SharedHandler = Arc<Mutex<Handler>>;

/// HTTP endpoint bound to an ephemeral localhost port.
pub struct StubServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl StubServer {
    /// Binds `127.0.0.1:0` and starts serving.
    pub async fn bind_ephemeral(handler: Handler) -> anyhow::Result<Self> {
        Self::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0), handler).await
    }

    /// Binds `addr` and starts serving. The handler sees requests one at a
    /// time.
    pub async fn bind(addr: SocketAddr, handler: Handler) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind stub server on {addr}"))?;
        let addr = listener.local_addr()?;

        let app = Router::new()
            .route("/", post(exchange))
            .with_state(Arc::new(Mutex::new(handler)));

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!(error = %e, "Stub server stopped");
            }
        });

        Ok(Self { addr, task })
    }

    /// Runs until the serving task ends.
    pub async fn wait(&mut self) -> anyhow::Result<()> {
        (&mut self.task).await.context("stub server task")
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn exchange(
    State(handler): State<SharedHandler>,
    Json(request): Json<RequestBody>,
) -> (StatusCode, String) {
    debug!(request = %request.request, "POST");
    let reply = {
        let mut handler = handler.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        handler(&request.request)
    };
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, reply.body)
}

/// Scripted simulation server.
///
/// `step` before `lights-init` gets a wait order. Once a `step` finds the
/// script empty the session is over and every request gets a stop order.
#[derive(Debug, Clone)]
pub struct Replay {
    board: BoardInit,
    lights: Vec<LightInit>,
    steps: VecDeque<StepResponse>,
    initialized: bool,
    finished: bool,
}

impl Replay {
    pub fn new(board: BoardInit, lights: Vec<LightInit>, steps: Vec<StepResponse>) -> Self {
        Self {
            board,
            lights,
            steps: steps.into(),
            initialized: false,
            finished: false,
        }
    }

    /// Steps not served yet.
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    /// Response body for one request name.
    pub fn respond(&mut self, request: &str) -> anyhow::Result<String> {
        if self.finished {
            return Ok(ControlOrder::Stop.body());
        }
        let body = match request {
            "board-init" => serde_json::to_string(&self.board)?,
            "lights-init" => {
                self.initialized = true;
                serde_json::to_string(&Items::new(self.lights.clone()))?
            }
            "step" if self.initialized => match self.steps.pop_front() {
                Some(step) => serde_json::to_string(&step)?,
                None => {
                    self.finished = true;
                    ControlOrder::Stop.body()
                }
            },
            _ => ControlOrder::Wait.body(),
        };
        Ok(body)
    }

    /// Wraps the replay as a [`StubServer`] handler. Encoding failures become
    /// HTTP 500.
    pub fn into_handler(mut self) -> Handler {
        Box::new(move |request: &str| match self.respond(request) {
            Ok(body) => Reply::ok(body),
            Err(e) => {
                warn!(error = %e, "Replay failed to encode");
                Reply::status(500)
            }
        })
    }

    /// A short session on a 10x10 board: one vehicle enters from the south,
    /// waits at the red light, turns right and leaves; a second one drives
    /// straight through from the west.
    pub fn demo() -> anyhow::Result<Self> {
        let lights = vec![
            light("North", "red", 5, 6),
            light("East", "red", 6, 4),
            light("South", "red", 4, 3),
            light("West", "green", 3, 5),
        ];

        let steps = vec![
            step(vec![car(1, "South", "spawned", "", (4, 0), (0, 0))], vec![])?,
            step(
                vec![
                    car(1, "South", "moving", "right", (4, 0), (4, 1)),
                    car(2, "West", "spawned", "", (0, 5), (0, 0)),
                ],
                vec![],
            )?,
            step(
                vec![
                    car(1, "South", "moving", "right", (4, 1), (4, 2)),
                    car(2, "West", "moving", "straight", (0, 5), (1, 5)),
                ],
                vec![],
            )?,
            step(
                vec![
                    car(1, "South", "stopped", "right", (4, 2), (4, 2)),
                    car(2, "West", "moving", "straight", (1, 5), (2, 5)),
                ],
                vec![],
            )?,
            step(
                vec![
                    car(1, "South", "stopped", "right", (4, 2), (4, 2)),
                    car(2, "West", "destroyed", "straight", (2, 5), (2, 5)),
                ],
                vec![signal("South", "green"), signal("West", "red")],
            )?,
            step(
                vec![car(1, "South", "turning", "right", (4, 2), (5, 3))],
                vec![],
            )?,
            step(
                vec![car(1, "South", "moving", "straight", (5, 3), (6, 3))],
                vec![signal("South", "yellow")],
            )?,
            step(
                vec![car(1, "South", "destroyed", "straight", (6, 3), (6, 3))],
                vec![signal("South", "red")],
            )?,
        ];

        Ok(Self::new(BoardInit { m: 10, n: 10 }, lights, steps))
    }
}

fn light(id: &str, state: &str, x: i32, y: i32) -> LightInit {
    LightInit {
        id: id.to_string(),
        state: state.to_string(),
        x,
        y,
    }
}

fn signal(id: &str, state: &str) -> LightStep {
    LightStep {
        id: id.to_string(),
        state: state.to_string(),
    }
}

fn car(
    id: i64,
    origin: &str,
    action: &str,
    turn: &str,
    (x1, y1): (i32, i32),
    (x2, y2): (i32, i32),
) -> CarStep {
    CarStep {
        id: VehicleId(id),
        x1,
        y1,
        x2,
        y2,
        origin: origin.to_string(),
        action: action.to_string(),
        turn: turn.to_string(),
    }
}

fn step(cars: Vec<CarStep>, lights: Vec<LightStep>) -> anyhow::Result<StepResponse> {
    Ok(StepResponse::encode(&cars, &lights)?)
}
