//! Shared helpers for sync engine tests
//!
//! [`FakeServer`] is an in-memory implementation of the transport port that
//! behaves like the records API (list with `since`, create, merging update,
//! delete). Individual requests can be scripted to fail, or to return fixed
//! bodies, in FIFO order per method and path. With a server clock the
//! server stamps `updatedAt` on every write instead of keeping the client's
//! value, optionally running ahead of the local clock.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Map, Value};

use tether_cache::{
    DatabasePool, SqliteCursorStore, SqliteEntityStore, SqliteOutboxStore, SqliteQueryCache,
};
use tether_core::domain::{CollectionName, ConnectivityStatus, Record, RecordId, Timestamp};
use tether_core::ports::{
    IPushConnector, ITransport, Method, StaticCredentials, TransportError, TransportRequest,
    TransportResponse,
};
use tether_sync::{RetryPolicy, SyncContext, SyncSettings, SyncStores};

pub type Reply = Result<TransportResponse, TransportError>;

// ============================================================================
// FakeServer
// ============================================================================

struct Scripted {
    method: Method,
    path: String,
    /// Matching requests to let through before this reply is used
    skip: usize,
    reply: Reply,
}

#[derive(Default)]
struct ServerState {
    records: BTreeMap<String, Vec<Record>>,
    scripted: VecDeque<Scripted>,
    next_id: u64,
    log: Vec<TransportRequest>,
    /// Offset of the server clock from the local one; `None` keeps the
    /// client's `updatedAt`
    clock_ahead: Option<i64>,
    last_stamp: i64,
}

impl ServerState {
    fn stamp(&mut self, body: &Map<String, Value>) -> Timestamp {
        let millis = match self.clock_ahead {
            Some(ahead) => {
                let at = (Timestamp::now().as_millis() + ahead).max(self.last_stamp + 1);
                self.last_stamp = at;
                at
            }
            None => body
                .get("updatedAt")
                .and_then(Value::as_i64)
                .unwrap_or_else(|| Timestamp::now().as_millis()),
        };
        Timestamp::from_millis(millis)
    }
}

#[derive(Default)]
pub struct FakeServer {
    state: Mutex<ServerState>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A server that stamps every write with its own clock, `ahead` of ours
    pub fn with_clock(ahead: Duration) -> Arc<Self> {
        let server = Self::default();
        server.state.lock().unwrap().clock_ahead = Some(ahead.as_millis() as i64);
        Arc::new(server)
    }

    /// Store a record as if another client had written it
    pub fn seed(&self, collection: &str, record: Record) {
        let mut state = self.state.lock().unwrap();
        let list = state.records.entry(collection.to_string()).or_default();
        list.retain(|r| r.id != record.id);
        list.push(record);
    }

    /// Drop a record as if another client had deleted it
    pub fn remove(&self, collection: &str, id: &str) {
        if let Some(list) = self.state.lock().unwrap().records.get_mut(collection) {
            list.retain(|r| r.id.as_str() != id);
        }
    }

    /// Answer the next `method path` request with `reply`
    pub fn script(&self, method: Method, path: &str, reply: Reply) {
        self.script_after(method, path, 0, reply);
    }

    /// Let `skip` matching requests through, then answer with `reply`
    pub fn script_after(&self, method: Method, path: &str, skip: usize, reply: Reply) {
        self.state.lock().unwrap().scripted.push_back(Scripted {
            method,
            path: path.to_string(),
            skip,
            reply,
        });
    }

    pub fn fail_with_status(&self, method: Method, path: &str, status: u16) {
        self.script(method, path, Ok(error_response(status)));
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.state.lock().unwrap().log.clone()
    }

    /// `METHOD /path` of every non-GET request, in arrival order
    pub fn writes(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| r.method != Method::Get)
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }

    pub fn stored(&self, collection: &str, id: &str) -> Option<Record> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(collection)
            .and_then(|list| list.iter().find(|r| r.id.as_str() == id).cloned())
    }

    fn handle(&self, request: &TransportRequest) -> Reply {
        let mut state = self.state.lock().unwrap();
        state.log.push(request.clone());

        if let Some(pos) = state
            .scripted
            .iter()
            .position(|s| s.method == request.method && s.path == request.path)
        {
            if state.scripted[pos].skip > 0 {
                state.scripted[pos].skip -= 1;
            } else if let Some(scripted) = state.scripted.remove(pos) {
                return scripted.reply;
            }
        }

        let segments: Vec<&str> = request.path.trim_start_matches('/').split('/').collect();
        match (request.method, segments.as_slice()) {
            (Method::Get, [collection]) => Ok(list(&state, collection, &request.query)),
            (Method::Get, [collection, id]) => Ok(
                match state
                    .records
                    .get(*collection)
                    .and_then(|l| l.iter().find(|r| r.id.as_str() == *id))
                {
                    Some(record) => ok(200, record),
                    None => not_found(),
                },
            ),
            (Method::Post, [collection]) => {
                state.next_id += 1;
                let id = RecordId::new(format!("srv-{}", state.next_id)).unwrap();
                let body = body_fields(request.body.as_ref());
                let mut record = Record::new(id, state.stamp(&body), body.clone());
                record.owner_id = owner(&body);
                state
                    .records
                    .entry(collection.to_string())
                    .or_default()
                    .push(record.clone());
                Ok(ok(201, &record))
            }
            (Method::Put, [collection, id]) => {
                let body = body_fields(request.body.as_ref());
                let at = state.stamp(&body);
                let Some(existing) = state
                    .records
                    .get_mut(*collection)
                    .and_then(|l| l.iter_mut().find(|r| r.id.as_str() == *id))
                else {
                    return Ok(not_found());
                };
                // Partial update: only the keys sent are changed.
                let changes = Record::new(existing.id.clone(), at, body.clone());
                existing.fields.extend(changes.fields);
                existing.updated_at = at;
                if let Some(owner) = owner(&body) {
                    existing.owner_id = Some(owner);
                }
                Ok(ok(200, existing))
            }
            (Method::Delete, [collection, id]) => {
                let Some(list) = state.records.get_mut(*collection) else {
                    return Ok(not_found());
                };
                let before = list.len();
                list.retain(|r| r.id.as_str() != *id);
                if list.len() == before {
                    return Ok(not_found());
                }
                Ok(TransportResponse::new(204, ""))
            }
            _ => Ok(not_found()),
        }
    }
}

#[async_trait::async_trait]
impl ITransport for FakeServer {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.handle(&request)
    }
}

fn param<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn list(state: &ServerState, collection: &str, query: &[(String, String)]) -> TransportResponse {
    let since: i64 = param(query, "since").and_then(|s| s.parse().ok()).unwrap_or(0);
    let page: usize = param(query, "page").and_then(|s| s.parse().ok()).unwrap_or(1);
    let size: usize = param(query, "pageSize").and_then(|s| s.parse().ok()).unwrap_or(50);

    let mut items: Vec<Record> = state
        .records
        .get(collection)
        .map(|l| {
            l.iter()
                .filter(|r| r.updated_at.as_millis() > since)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    items.sort_by(|a, b| (a.updated_at, &a.id).cmp(&(b.updated_at, &b.id)));

    let total = items.len();
    let start = (page - 1) * size;
    let has_more = total > start + size;
    let items: Vec<Record> = items.into_iter().skip(start).take(size).collect();
    page_response(items, has_more)
}

fn body_fields(body: Option<&Value>) -> Map<String, Value> {
    body.and_then(|b| b.as_object().cloned()).unwrap_or_default()
}

fn owner(body: &Map<String, Value>) -> Option<String> {
    body.get("ownerId").and_then(Value::as_str).map(str::to_string)
}

pub fn error_response(status: u16) -> TransportResponse {
    TransportResponse::new(
        status,
        json!({"error": format!("scripted {status}")}).to_string(),
    )
}

fn ok(status: u16, record: &Record) -> TransportResponse {
    TransportResponse::new(status, serde_json::to_string(record).unwrap())
}

fn not_found() -> TransportResponse {
    TransportResponse::new(404, r#"{"error":"not found"}"#)
}

/// A listing/delta response body
pub fn page_response(items: Vec<Record>, has_more: bool) -> TransportResponse {
    let total = items.len();
    TransportResponse::new(
        200,
        json!({"items": items, "page": 1, "pageSize": total, "total": total, "hasMore": has_more})
            .to_string(),
    )
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub server: Arc<FakeServer>,
    pub credentials: Arc<StaticCredentials>,
    pub stores: SyncStores,
    pub ctx: SyncContext,
    _pool: DatabasePool,
}

pub struct HarnessOptions {
    pub online: bool,
    pub token: Option<&'static str>,
    pub collections: Vec<&'static str>,
    pub page_size: u32,
    pub query_ttl: Duration,
    pub push: Option<Arc<dyn IPushConnector>>,
    /// Run the fake server on its own clock, this far ahead of ours
    pub server_clock: Option<Duration>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            online: true,
            token: Some("test-token"),
            collections: vec!["flowers"],
            page_size: 2,
            query_ttl: Duration::from_secs(300),
            push: None,
            server_clock: None,
        }
    }
}

pub async fn harness() -> Harness {
    harness_with(HarnessOptions::default()).await
}

pub async fn offline_harness() -> Harness {
    harness_with(HarnessOptions {
        online: false,
        ..HarnessOptions::default()
    })
    .await
}

pub async fn harness_with(options: HarnessOptions) -> Harness {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let stores = SyncStores {
        entities: Arc::new(SqliteEntityStore::new(
            pool.pool().clone(),
            Duration::from_secs(1800),
        )),
        query_cache: Arc::new(SqliteQueryCache::new(pool.pool().clone())),
        outbox: Arc::new(SqliteOutboxStore::new(pool.pool().clone())),
        cursors: Arc::new(SqliteCursorStore::new(pool.pool().clone())),
    };

    let server = match options.server_clock {
        Some(ahead) => FakeServer::with_clock(ahead),
        None => FakeServer::new(),
    };
    let credentials = Arc::new(StaticCredentials::new(options.token.map(str::to_string)));
    let settings = SyncSettings {
        collections: options.collections.into_iter().map(collection).collect(),
        page_size: options.page_size,
        retry: RetryPolicy::Immediate,
        query_ttl: options.query_ttl,
    };
    let initial = if options.online {
        ConnectivityStatus::Online
    } else {
        ConnectivityStatus::Offline
    };

    let mut ctx = SyncContext::new(
        server.clone(),
        credentials.clone(),
        stores.clone(),
        settings,
        initial,
    );
    if let Some(connector) = options.push {
        ctx = ctx.with_push(connector);
    }

    Harness {
        server,
        credentials,
        stores,
        ctx,
        _pool: pool,
    }
}

pub fn collection(name: &str) -> CollectionName {
    CollectionName::new(name.to_string()).unwrap()
}

pub fn flowers() -> CollectionName {
    collection("flowers")
}

pub fn id(s: &str) -> RecordId {
    RecordId::new(s.to_string()).unwrap()
}

pub fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

pub fn record(rid: &str, at: i64, name: &str) -> Record {
    Record::new(id(rid), Timestamp::from_millis(at), fields(json!({ "name": name })))
}

pub fn tombstone(rid: &str, at: i64) -> Record {
    Record::new(id(rid), Timestamp::from_millis(at), Map::new()).into_tombstone(Timestamp::from_millis(at))
}
