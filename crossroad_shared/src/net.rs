//! Wire protocol.
//!
//! Every exchange is one HTTP POST carrying `{"request": "<name>"}`. The
//! server answers with a JSON document whose shape depends on the request,
//! or with one of two reserved control orders that may come back for any
//! request.
//!
//! Arrays travel wrapped as `{"Items": [...]}`; `step` nests two of them as
//! JSON strings inside the outer document. Bare arrays are accepted too.

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::ProtocolViolation;

/// Server-assigned vehicle identity, unique while the vehicle is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub i64);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three request names of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    BoardInit,
    LightsInit,
    Step,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::BoardInit => "board-init",
            RequestKind::LightsInit => "lights-init",
            RequestKind::Step => "step",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestBody {
    pub request: String,
}

impl RequestBody {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
        }
    }
}

/// `board-init` answer: grid width `m` and depth `n`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardInit {
    pub m: i32,
    pub n: i32,
}

/// One entry of the `lights-init` answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LightInit {
    pub id: String,
    pub state: String,
    pub x: i32,
    pub y: i32,
}

/// One entry of the nested `lightsJson` array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LightStep {
    pub id: String,
    pub state: String,
}

/// One entry of the nested `carsJson` array.
///
/// Only `id` and `action` are mandatory; spawn records usually carry just the
/// origin and the first cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CarStep {
    pub id: VehicleId,
    #[serde(default)]
    pub x1: i32,
    #[serde(default)]
    pub y1: i32,
    #[serde(default)]
    pub x2: i32,
    #[serde(default)]
    pub y2: i32,
    #[serde(default)]
    pub origin: String,
    pub action: String,
    #[serde(default)]
    pub turn: String,
}

/// Outer `step` document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepResponse {
    #[serde(rename = "carsJson")]
    pub cars_json: String,
    #[serde(rename = "lightsJson")]
    pub lights_json: String,
}

impl StepResponse {
    /// Builds a step document the way the simulation server encodes it.
    pub fn encode(cars: &[CarStep], lights: &[LightStep]) -> serde_json::Result<Self> {
        Ok(Self {
            cars_json: serde_json::to_string(&Items::new(cars.to_vec()))?,
            lights_json: serde_json::to_string(&Items::new(lights.to_vec()))?,
        })
    }
}

/// `{"Items": [...]}` array wrapper. The key is required and nothing else may
/// sit next to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Items<T> {
    #[serde(rename = "Items")]
    pub items: Vec<T>,
}

impl<T> Items<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ItemList<T> {
    Wrapped(Items<T>),
    Bare(Vec<T>),
}

impl<T> From<ItemList<T>> for Vec<T> {
    fn from(list: ItemList<T>) -> Self {
        match list {
            ItemList::Wrapped(w) => w.items,
            ItemList::Bare(v) => v,
        }
    }
}

/// Reserved control orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOrder {
    /// The server halted; stop animating and stop asking.
    Stop,
    /// The server is not ready for this request yet.
    Wait,
}

impl ControlOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlOrder::Stop => "stop",
            ControlOrder::Wait => "wait",
        }
    }

    /// Body as the simulation server writes it.
    pub fn body(self) -> String {
        format!("{{\"order\": \"{}\"}}", self.as_str())
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct OrderBody {
    order: String,
}

/// Recognises a control order body. Anything other than exactly
/// `{"order": "stop"|"wait"}` is not a control order.
pub fn parse_control(body: &str) -> Option<ControlOrder> {
    let parsed: OrderBody = serde_json::from_str(body.trim()).ok()?;
    match parsed.order.as_str() {
        "stop" => Some(ControlOrder::Stop),
        "wait" => Some(ControlOrder::Wait),
        _ => None,
    }
}

/// Decoded data payload of a successful request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Board(BoardInit),
    Lights(Vec<LightInit>),
    Step {
        cars: Vec<CarStep>,
        lights: Vec<LightStep>,
    },
}

/// A response is either a control order or the payload for its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Control(ControlOrder),
    Payload(Payload),
}

/// Classifies and decodes a raw response body for `request`.
pub fn decode_response(request: RequestKind, body: &str) -> Result<Response, ProtocolViolation> {
    if let Some(order) = parse_control(body) {
        return Ok(Response::Control(order));
    }
    decode_payload(request, body).map(Response::Payload)
}

fn malformed(request: RequestKind, err: serde_json::Error) -> ProtocolViolation {
    ProtocolViolation::Malformed {
        request: request.as_str().to_string(),
        reason: err.to_string(),
    }
}

fn decode_list<T: DeserializeOwned>(
    request: RequestKind,
    s: &str,
) -> Result<Vec<T>, ProtocolViolation> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    let list: ItemList<T> = serde_json::from_str(s).map_err(|e| malformed(request, e))?;
    Ok(list.into())
}

/// Decodes the data payload of `request`.
pub fn decode_payload(request: RequestKind, body: &str) -> Result<Payload, ProtocolViolation> {
    match request {
        RequestKind::BoardInit => serde_json::from_str::<BoardInit>(body)
            .map(Payload::Board)
            .map_err(|e| malformed(request, e)),
        RequestKind::LightsInit => decode_list(request, body).map(Payload::Lights),
        RequestKind::Step => {
            let outer: StepResponse =
                serde_json::from_str(body).map_err(|e| malformed(request, e))?;
            Ok(Payload::Step {
                cars: decode_list(request, &outer.cars_json)?,
                lights: decode_list(request, &outer.lights_json)?,
            })
        }
    }
}
