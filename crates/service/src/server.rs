//! `RemoteAccessServer`: the state machine, request queue, and dispatch
//! loop that turns incoming requests into OD accesses and responses.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use codec::{
    abort::AbortCode,
    request::{AccessType, Request},
    response::{
        ObjectEnumResponse, ObjectInfoResponse, PingResponse, ReadResponse, Response,
        SubindexDescriptor, WriteResponse,
    },
};

use crate::{
    errors::CoreError,
    od::{ObjectDictionary, TrailingBitPolicy},
    roda::{Roda, Rodan, SendError},
    worker::WorkerHook,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    UnregisteredAndOff,
    UnregisteredAndIdle,
    Off,
    JustRegistered,
    Idle,
    Processing,
}

struct ApiState {
    state: State,
    queue: VecDeque<Request>,
    loan_requested: bool,
}

/// Sizing limits the server enforces on every incoming request. These are
/// announced to the client (minus whatever a forwarding mux subtracts for
/// its own RSI) via `on_ready`.
#[derive(Debug, Clone, Copy)]
pub struct ServerLimits {
    pub max_request_size: u32,
    pub max_response_size: u32,
    pub min_useful_response_size: u32,
}

/// Single-worker-thread transport and dispatch core.
///
/// All state transitions and OD access happen either directly here (under
/// `api_mutex`) or inside [`RemoteAccessServer::work`], which is expected to
/// run exclusively on one worker thread. `register`/`unregister`/`send`/
/// `request_execution_context` may be called concurrently from any thread.
pub struct RemoteAccessServer {
    client: Mutex<Option<Arc<dyn Rodan>>>,
    api: Mutex<ApiState>,
    unregister_serialize: Mutex<()>,
    unregister_pending: AtomicBool,
    worker_hook: Arc<dyn WorkerHook>,
    od: Arc<dyn ObjectDictionary>,
    limits: ServerLimits,
}

impl RemoteAccessServer {
    pub fn new(
        od: Arc<dyn ObjectDictionary>,
        worker_hook: Arc<dyn WorkerHook>,
        limits: ServerLimits,
    ) -> Arc<Self> {
        Arc::new(Self {
            client: Mutex::new(None),
            api: Mutex::new(ApiState {
                state: State::UnregisteredAndOff,
                queue: VecDeque::new(),
                loan_requested: false,
            }),
            unregister_serialize: Mutex::new(()),
            unregister_pending: AtomicBool::new(false),
            worker_hook,
            od,
            limits,
        })
    }

    /// Transition from a not-running to a running state, delivering
    /// `on_ready` immediately if a client is already registered.
    pub fn on_start(&self) -> Result<(), CoreError> {
        let client = self.client.lock();
        let mut api = self.api.lock();

        match api.state {
            State::UnregisteredAndOff => {
                api.state = State::UnregisteredAndIdle;
                Ok(())
            }
            State::Off => {
                api.state = State::Idle;
                let rodan = client.as_ref().expect("registered states always carry a client").clone();
                drop(api);
                drop(client);
                rodan.on_ready(self.limits.max_request_size, self.limits.max_response_size);
                Ok(())
            }
            State::UnregisteredAndIdle | State::JustRegistered | State::Idle | State::Processing => {
                Err(CoreError::AlreadyRunning)
            }
        }
    }

    /// Transition from running to not-running, delivering `on_disconnected`
    /// if a client was registered and dropping any queued work.
    pub fn on_stop(&self) -> Result<(), CoreError> {
        let client = self.client.lock();
        let mut api = self.api.lock();

        match api.state {
            State::UnregisteredAndIdle => {
                api.state = State::UnregisteredAndOff;
                Ok(())
            }
            State::JustRegistered => {
                api.state = State::Off;
                Ok(())
            }
            State::Idle => {
                api.state = State::Off;
                api.loan_requested = false;
                let rodan = client.as_ref().expect("registered states always carry a client").clone();
                drop(api);
                drop(client);
                rodan.on_disconnected();
                Ok(())
            }
            State::Processing => {
                api.state = State::Off;
                api.loan_requested = false;
                api.queue.clear();
                let rodan = client.as_ref().expect("registered states always carry a client").clone();
                drop(api);
                drop(client);
                rodan.on_disconnected();
                Ok(())
            }
            State::UnregisteredAndOff | State::Off => Err(CoreError::AlreadyStopped),
        }
    }

    /// The worker-thread step. Does at most one unit of work, then returns.
    pub fn work(&self) {
        if self.unregister_pending.load(Ordering::SeqCst) {
            return;
        }

        let client = self.client.lock();
        let Some(rodan) = client.clone() else {
            return;
        };

        let mut api = self.api.lock();

        if api.state == State::JustRegistered && api.queue.is_empty() && !api.loan_requested {
            api.state = State::Idle;
            drop(api);
            drop(client);
            rodan.on_ready(self.limits.max_request_size, self.limits.max_response_size);
            return;
        }

        if api.loan_requested {
            api.loan_requested = false;
            if api.state == State::Processing {
                self.worker_hook.request_work_invocation();
            }
            drop(api);
            drop(client);
            rodan.loan_execution_context();
            return;
        }

        if api.state == State::Processing {
            let Some(mut request) = api.queue.pop_front() else {
                // Invariant violation: Processing with an empty queue and no
                // loan pending should be unreachable.
                api.state = State::Idle;
                return;
            };

            if !api.queue.is_empty() {
                self.worker_hook.request_work_invocation();
            } else {
                api.state = State::Idle;
            }

            drop(api);
            drop(client);

            let mut response = self.dispatch(&request);
            let rsi = request.take_rsi();
            *response.rsi_mut() = rsi;
            rodan.on_request_processed(response);
        }
    }

    fn sanity_check(&self, request: &Request) -> Result<(), CoreError> {
        if request.encoded_size() as u32 > self.limits.max_request_size {
            return Err(CoreError::RequestTooLarge);
        }
        if request.max_response_size() > self.limits.max_response_size {
            return Err(CoreError::ResponseTooLarge);
        }

        let rsi_size = request.rsi().wire_size() as u32;
        if request.max_response_size().saturating_sub(rsi_size) < self.limits.min_useful_response_size {
            return Err(CoreError::MinResponseSizeNotMet);
        }

        Ok(())
    }

    fn dispatch(&self, request: &Request) -> Response {
        match request {
            Request::Ping(_) => Response::Ping(PingResponse {
                rsi: Default::default(),
            }),
            Request::ObjectEnum(req) => {
                let budget = req
                    .max_response_size
                    .saturating_sub(codec::response::HEADER_LEN as u32)
                    .saturating_sub(req.rsi.wire_size() as u32);
                // count(u16) + complete(u8) is the fixed shell; each index costs 2 bytes.
                let max_indices = budget.saturating_sub(3) / 2;

                if max_indices == 0 {
                    return Response::ObjectEnum(ObjectEnumResponse {
                        abort_code: AbortCode::OBJECT_LENGTH_EXCEEDS_MBX_SIZE,
                        indices: Vec::new(),
                        complete: false,
                        rsi: Default::default(),
                    });
                }

                let mut indices = Vec::new();
                let mut cursor = req.start_index;
                let mut complete = true;

                loop {
                    let Some(object) = self.od.get_next_nearest_object(cursor) else {
                        break;
                    };
                    if object.index() > req.last_index {
                        break;
                    }

                    let matches = req.attribute_filter == 0xFFFF
                        || object_matches_filter(object.as_ref(), req.attribute_filter);

                    if matches {
                        if indices.len() as u32 >= max_indices {
                            complete = false;
                            break;
                        }
                        indices.push(object.index());
                    }

                    match object.index().checked_add(1) {
                        Some(next) => cursor = next,
                        None => break,
                    }
                }

                Response::ObjectEnum(ObjectEnumResponse {
                    abort_code: AbortCode::OK,
                    indices,
                    complete,
                    rsi: Default::default(),
                })
            }
            Request::ObjectInfo(req) => {
                let Some(object) = self.od.get_object(req.index) else {
                    return Response::ObjectInfo(ObjectInfoResponse {
                        abort_code: AbortCode::OBJECT_DOES_NOT_EXIST,
                        first_queried_subindex: req.first_si,
                        last_queried_subindex: req.first_si,
                        complete: true,
                        object_code: 0,
                        data_type: 0,
                        name: None,
                        max_subindex_count: 0,
                        subindices: Vec::new(),
                        rsi: Default::default(),
                    });
                };

                let last_si = req.last_si.min(object.max_subindex_count().saturating_sub(1) as u8);
                let name = req.include_names.then(|| object.name().map(str::to_owned)).flatten();

                // Fixed shell: header + the scalar fields (first_si, last_si,
                // complete, object_code, data_type, max_subindex_count,
                // subindex_count) + the name's length-prefixed bytes + the
                // RSI stack this request is carrying.
                let fixed_shell = codec::response::HEADER_LEN
                    + 1 + 1 + 1 + 1 + 2
                    + 2 + name.as_deref().map_or(0, str::len)
                    + 2 + 2
                    + req.rsi.wire_size();
                let budget = (req.max_response_size as usize).saturating_sub(fixed_shell);

                let mut subindices = Vec::new();
                let mut abort_code = AbortCode::OK;
                let mut last_queried_subindex = req.first_si;
                let mut used = 0usize;
                let mut truncated_by_size = false;

                object.lock_data(&mut |data| {
                    for si in req.first_si..=last_si {
                        let descriptor = SubindexDescriptor {
                            subindex: si,
                            empty: data.subindex_empty(si),
                            data_type: object.data_type(),
                            attribute_bits: data.subindex_attributes(si),
                            max_size_bits: data.subindex_actual_size_bits(si) as u32,
                            name: req.include_names.then(|| data.subindex_name(si).map(str::to_owned)).flatten(),
                            app_specific_metadata: req
                                .include_app_specific_metadata
                                .then(|| data.subindex_app_specific_metadata(si).map(|m| m.to_vec()))
                                .flatten(),
                        };

                        let cost = descriptor.wire_size();
                        if used + cost > budget {
                            truncated_by_size = true;
                            break;
                        }

                        used += cost;
                        last_queried_subindex = si;
                        subindices.push(descriptor);
                    }
                    abort_code = AbortCode::OK;
                    abort_code
                });

                Response::ObjectInfo(ObjectInfoResponse {
                    abort_code,
                    first_queried_subindex: req.first_si,
                    last_queried_subindex,
                    complete: !truncated_by_size && last_queried_subindex == req.last_si,
                    object_code: object.object_code(),
                    data_type: object.data_type(),
                    name,
                    max_subindex_count: object.max_subindex_count(),
                    subindices,
                    rsi: Default::default(),
                })
            }
            Request::Read(req) => {
                let Some(object) = self.od.get_object(req.index) else {
                    return Response::Read(ReadResponse {
                        abort_code: AbortCode::OBJECT_DOES_NOT_EXIST,
                        data: Vec::new(),
                        bits_in_last_byte: 0,
                        rsi: Default::default(),
                    });
                };

                let si0_16bit = matches!(req.access_type, AccessType::CompleteAccessSi0_16Bit);
                let complete = req.access_type.is_complete_access();

                // header + data_len(u16) + bits_in_last_byte(u8) + the RSI
                // stack this request is carrying.
                let fixed_shell = codec::response::HEADER_LEN + 2 + 1 + req.rsi.wire_size();
                let allowed_payload_bytes = (req.max_response_size as usize).saturating_sub(fixed_shell);

                let mut abort_code = AbortCode::OK;
                let mut data = Vec::new();
                let mut bit_size = 0usize;

                object.lock_data(&mut |od_data| {
                    if !complete && od_data.subindex_empty(req.subindex) {
                        abort_code = AbortCode::SUBINDEX_DOES_NOT_EXIST;
                        return abort_code;
                    }

                    bit_size = if complete {
                        od_data.object_stream_size_bits(si0_16bit)
                    } else {
                        od_data.subindex_actual_size_bits(req.subindex)
                    };

                    if bit_size.div_ceil(8) > allowed_payload_bytes {
                        abort_code = AbortCode::OBJECT_LENGTH_EXCEEDS_MBX_SIZE;
                        return abort_code;
                    }

                    abort_code = if complete {
                        od_data.complete_read(req.subindex == 0, si0_16bit, req.permissions, &mut data)
                    } else {
                        od_data.read(req.subindex, req.permissions, &mut data)
                    };
                    abort_code
                });

                if !abort_code.is_ok() {
                    data.clear();
                }

                let bits_in_last_byte = if data.is_empty() { 0 } else { ((bit_size - 1) % 8 + 1) as u8 };

                Response::Read(ReadResponse {
                    abort_code,
                    data,
                    bits_in_last_byte,
                    rsi: Default::default(),
                })
            }
            Request::Write(req) => {
                let Some(object) = self.od.get_object(req.index) else {
                    return Response::Write(WriteResponse {
                        abort_code: AbortCode::OBJECT_DOES_NOT_EXIST,
                        rsi: Default::default(),
                    });
                };

                let si0_16bit = matches!(req.access_type, AccessType::CompleteAccessSi0_16Bit);
                let complete = req.access_type.is_complete_access();
                let mut abort_code = AbortCode::OK;

                object.lock_data(&mut |od_data| {
                    abort_code = if complete {
                        od_data.complete_write(
                            req.subindex == 0,
                            si0_16bit,
                            req.permissions,
                            &req.data,
                            TrailingBitPolicy::RequireZero,
                        )
                    } else {
                        od_data.write(req.subindex, req.permissions, &req.data)
                    };
                    abort_code
                });

                Response::Write(WriteResponse {
                    abort_code,
                    rsi: Default::default(),
                })
            }
        }
    }
}

/// Whether any subindex of `object` carries an attribute overlapping
/// `filter`, used by `ObjectEnum`'s non-`0xFFFF` filter path.
fn object_matches_filter(object: &dyn crate::od::ObjectHandle, filter: u16) -> bool {
    let mut matched = false;
    object.lock_data(&mut |data| {
        for si in 0..=object.max_subindex_count().saturating_sub(1).min(u8::MAX as u16) as u8 {
            if data.subindex_attributes(si) & filter != 0 {
                matched = true;
                break;
            }
        }
        AbortCode::OK
    });
    matched
}

impl Roda for RemoteAccessServer {
    fn register(&self, rodan: Arc<dyn Rodan>) -> Result<(), CoreError> {
        let mut client = self.client.lock();
        let mut api = self.api.lock();

        match api.state {
            State::UnregisteredAndOff => {
                *client = Some(rodan);
                api.state = State::Off;
                Ok(())
            }
            State::UnregisteredAndIdle => {
                *client = Some(rodan);
                api.state = State::JustRegistered;
                drop(api);
                drop(client);
                self.worker_hook.request_work_invocation();
                Ok(())
            }
            State::Off | State::JustRegistered | State::Idle | State::Processing => {
                Err(CoreError::AlreadyRegistered)
            }
        }
    }

    fn unregister(&self) {
        let _serialize = self.unregister_serialize.lock();
        self.unregister_pending.store(true, Ordering::SeqCst);

        let mut client = self.client.lock();
        let mut api = self.api.lock();

        match api.state {
            State::Off => {
                api.state = State::UnregisteredAndOff;
                api.queue.clear();
            }
            State::JustRegistered | State::Idle | State::Processing => {
                api.state = State::UnregisteredAndIdle;
                api.queue.clear();
            }
            State::UnregisteredAndOff | State::UnregisteredAndIdle => {}
        }

        api.loan_requested = false;
        *client = None;
        self.unregister_pending.store(false, Ordering::SeqCst);
    }

    fn send(&self, request: Request) -> Result<(), SendError> {
        let client = self.client.lock();
        let mut api = self.api.lock();

        let wrap = |error: CoreError, request: Request| SendError { error, request };

        match api.state {
            State::UnregisteredAndOff | State::UnregisteredAndIdle => {
                Err(wrap(CoreError::NotRegistered, request))
            }
            State::Off | State::JustRegistered => Err(wrap(CoreError::NotReady, request)),
            State::Idle => {
                if let Err(error) = self.sanity_check(&request) {
                    return Err(wrap(error, request));
                }
                api.queue.push_back(request);
                api.state = State::Processing;
                drop(api);
                drop(client);
                self.worker_hook.request_work_invocation();
                Ok(())
            }
            State::Processing => {
                if let Err(error) = self.sanity_check(&request) {
                    return Err(wrap(error, request));
                }
                api.queue.push_back(request);
                Ok(())
            }
        }
    }

    fn request_execution_context(&self) -> Result<(), CoreError> {
        let client = self.client.lock();
        let mut api = self.api.lock();

        match api.state {
            State::UnregisteredAndOff | State::UnregisteredAndIdle => Err(CoreError::NotRegistered),
            State::Off | State::JustRegistered => Err(CoreError::NotReady),
            State::Idle => {
                api.loan_requested = true;
                drop(api);
                drop(client);
                self.worker_hook.request_work_invocation();
                Ok(())
            }
            State::Processing => {
                api.loan_requested = true;
                Ok(())
            }
        }
    }
}
