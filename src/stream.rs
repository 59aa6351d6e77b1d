//! Result stream state machine and the `Record` type it yields.
//!
//! A stream moves through `Starting` (waiting on RUN's SUCCESS, which
//! carries the field names) -> `Streaming` (RECORDs arriving, then
//! PULL_ALL's terminal SUCCESS/FAILURE) -> `Drained`/`Failed`. `Closed` is
//! entered explicitly, or pushed in from outside by the owning session's
//! job registry when the session itself ends or resets mid-stream.

use std::collections::VecDeque;

use crate::constant::StatementType;
use crate::error::{Error, ServerFailure};
use crate::job::{JobHandle, SessionEvent};
use crate::mpool::Mpool;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Starting,
    Streaming,
    Drained,
    Failed,
    Closed,
}

/// One row of a result, decoded into its own arena so records can be held
/// onto (or dropped) independently of the rest of the stream's backlog.
pub struct Record {
    pool: Mpool,
    fields: Box<[Value<'static>]>,
}

impl Record {
    /// # Safety
    /// `fields` must have been decoded out of `pool` and must not be used
    /// after `pool` is mutated again (it never is: `Record` never exposes
    /// `pool` for further allocation).
    unsafe fn new(pool: Mpool, fields: Box<[Value<'static>]>) -> Self {
        Self { pool, fields }
    }

    pub fn fields(&self) -> &[Value<'_>] {
        &self.fields
    }

    pub fn get(&self, index: usize) -> Option<Value<'_>> {
        self.fields.get(index).copied()
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record").field("fields", &self.fields).finish()
    }
}

/// Decode a freshly read RECORD message's fields into their own pool, then
/// erase the borrow's lifetime so the pool and its values can travel
/// together inside one `Record`.
pub(crate) fn decode_record(raw: &[u8]) -> crate::error::Result<Record> {
    let pool = Mpool::new();
    let msg = crate::message::Message::decode(raw, &pool)?;
    let owned: Vec<Value<'_>> = msg.fields.to_vec();
    // SAFETY: `owned` borrows from `pool`, which is moved into the `Record`
    // below without further mutation; the arena's backing allocations are
    // heap blocks that do not move even if `Mpool`'s own `Vec<Block>`
    // metadata is relocated, so the widened references stay valid for the
    // lifetime of the `Record`.
    let fields: Box<[Value<'static>]> = unsafe {
        std::mem::transmute::<Box<[Value<'_>]>, Box<[Value<'static>]>>(owned.into_boxed_slice())
    };
    // SAFETY: see `Record::new`; `fields` was decoded from `pool` above.
    Ok(unsafe { Record::new(pool, fields) })
}

/// Summary metadata extracted from a terminal SUCCESS.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub statement_type: Option<StatementType>,
    pub nodes_created: i64,
    pub relationships_created: i64,
    pub properties_set: i64,
    pub nodes_deleted: i64,
    pub relationships_deleted: i64,
    pub statement_plan: Option<Plan>,
}

/// One node of a query plan (or profiled plan) tree, as reported in a
/// terminal SUCCESS's `plan`/`profile` metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plan {
    pub operator_type: String,
    pub identifiers: Vec<String>,
    pub children: Vec<Plan>,
}

fn decode_plan(value: &Value<'_>) -> Option<Plan> {
    let map = value.as_map()?;
    let mut plan = Plan::default();
    for (k, v) in map {
        match *k {
            "operatorType" => {
                if let Some(s) = v.as_str() {
                    plan.operator_type = s.to_owned();
                }
            }
            "identifiers" => {
                if let Some(list) = v.as_list() {
                    plan.identifiers = list.iter().filter_map(Value::as_str).map(str::to_owned).collect();
                }
            }
            "children" => {
                if let Some(list) = v.as_list() {
                    plan.children = list.iter().filter_map(decode_plan).collect();
                }
            }
            _ => {}
        }
    }
    Some(plan)
}

pub(crate) enum Disposition {
    Keep,
    Pop,
}

/// Internal, session-owned state for one `RUN` + `PULL_ALL` pair.
pub(crate) struct StreamState {
    status: Status,
    field_names: Vec<String>,
    records: VecDeque<Record>,
    summary: Summary,
    error: Option<Error>,
}

impl StreamState {
    pub(crate) fn new() -> Self {
        Self {
            status: Status::Starting,
            field_names: Vec::new(),
            records: VecDeque::new(),
            summary: Summary::default(),
            error: None,
        }
    }

    pub(crate) fn status(&self) -> Status {
        self.status
    }

    pub(crate) fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub(crate) fn summary(&self) -> &Summary {
        &self.summary
    }

    pub(crate) fn pop_record(&mut self) -> Option<Record> {
        self.records.pop_front()
    }

    /// Buffer a decoded record, unless the stream has been closed early (in
    /// which case it's silently dropped: the caller asked to stop reading).
    pub(crate) fn push_record(&mut self, record: Record) {
        if self.status == Status::Closed {
            return;
        }
        self.records.push_back(record);
    }

    /// Called by the session dispatch loop when a SUCCESS arrives for this
    /// stream's slot. Returns whether the session should keep this stream
    /// at the head of its pending queue.
    pub(crate) fn on_success(&mut self, metadata: &[(&str, Value<'_>)]) -> Disposition {
        match self.status {
            Status::Starting => {
                if let Some((_, Value::List(fields))) =
                    metadata.iter().find(|(k, _)| *k == "fields")
                {
                    self.field_names = fields
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(str::to_owned)
                        .collect();
                }
                self.status = Status::Streaming;
                Disposition::Keep
            }
            Status::Streaming => {
                self.apply_summary_metadata(metadata);
                self.status = Status::Drained;
                Disposition::Pop
            }
            _ => Disposition::Pop,
        }
    }

    fn apply_summary_metadata(&mut self, metadata: &[(&str, Value<'_>)]) {
        for (key, value) in metadata {
            match *key {
                "type" => {
                    if let Some(s) = value.as_str() {
                        self.summary.statement_type = StatementType::from_wire(s);
                    }
                }
                "stats" => {
                    if let Some(stats) = value.as_map() {
                        for (k, v) in stats {
                            let n = v.as_int().unwrap_or(0);
                            match *k {
                                "nodes-created" => self.summary.nodes_created = n,
                                "relationships-created" => self.summary.relationships_created = n,
                                "properties-set" => self.summary.properties_set = n,
                                "nodes-deleted" => self.summary.nodes_deleted = n,
                                "relationships-deleted" => self.summary.relationships_deleted = n,
                                _ => {}
                            }
                        }
                    }
                }
                "plan" | "profile" => {
                    self.summary.statement_plan = decode_plan(value);
                }
                _ => {}
            }
        }
    }

    pub(crate) fn on_failure(&mut self, failure: ServerFailure) -> Disposition {
        self.status = Status::Failed;
        self.error = Some(Error::ServerFailure(failure));
        Disposition::Pop
    }

    pub(crate) fn on_ignored(&mut self) -> Disposition {
        self.status = Status::Failed;
        self.error = Some(Error::PreviousFailure);
        Disposition::Pop
    }

    pub(crate) fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    pub(crate) fn close(&mut self) {
        if !matches!(self.status, Status::Drained | Status::Failed) {
            self.status = Status::Closed;
        }
        self.records.clear();
    }
}

impl JobHandle for StreamState {
    fn on_session_event(&mut self, event: SessionEvent) {
        if matches!(self.status, Status::Drained | Status::Failed | Status::Closed) {
            return;
        }
        self.status = Status::Closed;
        self.error = Some(match event {
            SessionEvent::Ended => Error::SessionEnded,
            SessionEvent::Reset => Error::SessionReset,
        });
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_success_captures_field_names() {
        let mut state = StreamState::new();
        let fields = [Value::String("n"), Value::String("m")];
        let metadata = [("fields", Value::List(&fields))];
        state.on_success(&metadata);
        assert_eq!(state.status(), Status::Streaming);
        assert_eq!(state.field_names(), &["n".to_string(), "m".to_string()]);
    }

    #[test]
    fn streaming_success_drains_and_reads_stats() {
        let mut state = StreamState::new();
        state.on_success(&[("fields", Value::List(&[]))]);
        let stats = [("nodes-created", Value::Int(3))];
        let metadata = [("type", Value::String("w")), ("stats", Value::Map(&stats))];
        state.on_success(&metadata);
        assert_eq!(state.status(), Status::Drained);
        assert_eq!(state.summary().nodes_created, 3);
        assert_eq!(state.summary().statement_type, Some(StatementType::WriteOnly));
    }

    #[test]
    fn session_end_closes_an_active_stream() {
        let mut state = StreamState::new();
        state.on_session_event(SessionEvent::Ended);
        assert_eq!(state.status(), Status::Closed);
    }

    #[test]
    fn record_fields_are_readable_after_pool_moves_with_it() {
        let bytes = crate::message::Message::encode(
            crate::constant::message::RECORD,
            &[Value::Int(1), Value::String("hello")],
        );
        let record = decode_record(&bytes).unwrap();
        assert_eq!(record.get(0), Some(Value::Int(1)));
        assert_eq!(record.get(1).and_then(|v| v.as_str().map(str::to_owned)), Some("hello".to_string()));
    }
}
