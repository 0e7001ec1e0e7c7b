//! The dispatch state machine.
//!
//! [`Dispatcher`] is sans-io: it owns the tokenizer, the token queue, the
//! in-flight request table and the current message parser. Received chunks
//! go in through [`feed`](Dispatcher::feed); request futures are completed
//! through the oneshot senders stored in the in-flight entries, and
//! everything else the reader task must act on (handshake, asynchronous
//! messages, out-of-band server errors) comes back as [`Signal`]s.
//!
//! Reply and error headers are two tokens and asynchronous headers are
//! three; the machine only leaves `Idle` once a whole header is queued, so
//! a chunk boundary can never leave a header half-decoded. While a message
//! parser is active it is the only consumer of tokens, which keeps
//! asynchronous messages from preempting an in-progress reply parse.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use protocol_lyskom::catalog::{self, AsyncDescriptor, ERROR_REPLY, RpcDescriptor};
use protocol_lyskom::{
    encode_request, Frame, ParseError, ParseProgress, Parser, Token, TokenLimits, TokenStream,
    Value, latin1,
};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::Error;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Connecting,
    Open,
    Closed,
}

/// A side effect for the reader task to run outside the dispatcher lock.
#[derive(Debug)]
pub(crate) enum Signal {
    /// The server handshake arrived; the connection is open.
    Connected,
    /// A catalogued asynchronous message completed parsing.
    AsyncEvent { name: &'static str, value: Value },
    /// An out-of-band `%%` server error (connection still usable).
    ServerError(Bytes),
}

struct InFlight {
    rpc: &'static RpcDescriptor,
    resolver: oneshot::Sender<Result<Value, Error>>,
}

enum ReadState {
    Idle,
    Reply { parser: Parser, entry: InFlight },
    ErrorReply { parser: Parser, entry: InFlight },
    Async { desc: &'static AsyncDescriptor, parser: Parser },
    SkipAsync { remaining: u32 },
}

#[derive(Clone, Copy)]
enum Head {
    Reply,
    ErrorReply,
    Async,
    Bad,
}

pub(crate) struct Dispatcher {
    stream: TokenStream,
    queue: VecDeque<Token>,
    read: ReadState,
    in_flight: HashMap<u32, InFlight>,
    next_ref: u32,
    phase: Phase,
    max_in_flight: usize,
}

impl Dispatcher {
    pub fn new(limits: TokenLimits, max_in_flight: usize) -> Self {
        Self {
            stream: TokenStream::with_limits(true, limits),
            queue: VecDeque::new(),
            read: ReadState::Idle,
            in_flight: HashMap::new(),
            next_ref: 0,
            phase: Phase::Connecting,
            max_in_flight,
        }
    }

    /// Validate and encode a request, allocate its reference number, and
    /// record it in the in-flight table. The caller writes the returned
    /// bytes to the socket and awaits the receiver.
    pub fn start_call(
        &mut self,
        name: &str,
        params: &Value,
    ) -> Result<(u32, Vec<u8>, oneshot::Receiver<Result<Value, Error>>), Error> {
        if self.phase != Phase::Open {
            return Err(Error::Closed);
        }
        if self.in_flight.len() >= self.max_in_flight {
            return Err(Error::TooManyInFlight);
        }
        let rpc = catalog::rpc(name).ok_or_else(|| Error::UnknownCall(name.to_string()))?;
        let ref_no = self.next_free_ref();
        // a rejected parameter must not burn the reference number
        let bytes = encode_request(ref_no, rpc, params)?;
        self.next_ref = ref_no.wrapping_add(1);
        let (tx, rx) = oneshot::channel();
        self.in_flight.insert(ref_no, InFlight { rpc, resolver: tx });
        trace!(ref_no, call = rpc.name, "request registered");
        Ok((ref_no, bytes, rx))
    }

    /// Drop an in-flight entry whose request bytes never reached the wire.
    pub fn abort_call(&mut self, ref_no: u32) {
        self.in_flight.remove(&ref_no);
    }

    fn next_free_ref(&self) -> u32 {
        // wraps after 2^32 requests; numbers still in flight are skipped
        let mut ref_no = self.next_ref;
        while self.in_flight.contains_key(&ref_no) {
            ref_no = ref_no.wrapping_add(1);
        }
        ref_no
    }

    /// Consume a received chunk. On a fatal error every in-flight request
    /// has already been failed and the dispatcher is `Closed`.
    pub fn feed(&mut self, chunk: &[u8], signals: &mut Vec<Signal>) -> Result<(), Error> {
        if self.phase == Phase::Closed {
            return Ok(());
        }
        self.stream.push(chunk);
        self.checked_pump(signals)
    }

    /// Signal end of input from the peer.
    pub fn finish(&mut self, signals: &mut Vec<Signal>) -> Result<(), Error> {
        if self.phase == Phase::Closed {
            return Ok(());
        }
        self.stream.finish();
        self.checked_pump(signals)
    }

    /// Fail all in-flight requests and become `Closed`. Returns false when
    /// already closed.
    pub fn close(&mut self) -> bool {
        if self.phase == Phase::Closed {
            return false;
        }
        debug!(pending = self.in_flight.len(), "closing connection");
        self.phase = Phase::Closed;
        self.fail_all(|| Error::Closed);
        true
    }

    fn checked_pump(&mut self, signals: &mut Vec<Signal>) -> Result<(), Error> {
        match self.pump(signals) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.phase = Phase::Closed;
                self.fail_all(|| replicate_fatal(&e));
                Err(e)
            }
        }
    }

    fn pump(&mut self, signals: &mut Vec<Signal>) -> Result<(), Error> {
        while let Some(frame) = self.stream.next_frame()? {
            match frame {
                Frame::Handshake => {
                    debug!("server handshake received");
                    self.phase = Phase::Open;
                    signals.push(Signal::Connected);
                }
                Frame::ServerError(text) => {
                    if self.phase == Phase::Connecting {
                        return Err(Error::Server(latin1::decode(&text)));
                    }
                    warn!(message = %latin1::decode(&text), "server error");
                    signals.push(Signal::ServerError(text));
                }
                Frame::Token(token) => {
                    self.queue.push_back(token);
                    self.run_machine(signals)?;
                }
            }
        }
        Ok(())
    }

    fn run_machine(&mut self, signals: &mut Vec<Signal>) -> Result<(), Error> {
        loop {
            match std::mem::replace(&mut self.read, ReadState::Idle) {
                ReadState::Idle => {
                    let head = match self.queue.front() {
                        None => return Ok(()),
                        Some(Token::Equals) => Head::Reply,
                        Some(Token::Percent) => Head::ErrorReply,
                        Some(Token::Colon) => Head::Async,
                        Some(_) => Head::Bad,
                    };
                    match head {
                        Head::Reply | Head::ErrorReply => {
                            if self.queue.len() < 2 {
                                return Ok(());
                            }
                            self.queue.pop_front();
                            let ref_no = pop_header_int(&mut self.queue)?;
                            let Some(entry) = self.in_flight.remove(&ref_no) else {
                                return Err(protocol("reply references an unknown request"));
                            };
                            self.read = match head {
                                Head::Reply => {
                                    trace!(ref_no, call = entry.rpc.name, "reply header");
                                    ReadState::Reply {
                                        parser: Parser::new(entry.rpc.response),
                                        entry,
                                    }
                                }
                                _ => {
                                    trace!(ref_no, call = entry.rpc.name, "error reply header");
                                    ReadState::ErrorReply {
                                        parser: Parser::new(ERROR_REPLY),
                                        entry,
                                    }
                                }
                            };
                        }
                        Head::Async => {
                            if self.queue.len() < 3 {
                                return Ok(());
                            }
                            self.queue.pop_front();
                            let num_params = pop_header_int(&mut self.queue)?;
                            let msg_no = pop_header_int(&mut self.queue)?;
                            self.read = match catalog::async_message(msg_no) {
                                Some(desc) => ReadState::Async {
                                    desc,
                                    parser: Parser::new(desc.schema),
                                },
                                None => {
                                    debug!(msg_no, num_params, "skipping unknown asynchronous message");
                                    ReadState::SkipAsync {
                                        remaining: num_params,
                                    }
                                }
                            };
                        }
                        Head::Bad => {
                            return Err(protocol("unexpected token between messages"));
                        }
                    }
                }
                ReadState::Reply { mut parser, entry } => {
                    match parser.advance(&mut self.queue) {
                        Err(e) => {
                            let error = Error::Protocol(e);
                            let _ = entry.resolver.send(Err(replicate_fatal(&error)));
                            return Err(error);
                        }
                        Ok(ParseProgress::Incomplete) => {
                            self.read = ReadState::Reply { parser, entry };
                            return Ok(());
                        }
                        Ok(ParseProgress::Complete(value)) => {
                            trace!(call = entry.rpc.name, "reply complete");
                            let _ = entry.resolver.send(Ok(value));
                        }
                    }
                }
                ReadState::ErrorReply { mut parser, entry } => {
                    match parser.advance(&mut self.queue) {
                        Err(e) => {
                            let error = Error::Protocol(e);
                            let _ = entry.resolver.send(Err(replicate_fatal(&error)));
                            return Err(error);
                        }
                        Ok(ParseProgress::Incomplete) => {
                            self.read = ReadState::ErrorReply { parser, entry };
                            return Ok(());
                        }
                        Ok(ParseProgress::Complete(value)) => {
                            let code = value.get("errorCode").and_then(Value::as_u32).unwrap_or(0);
                            let status =
                                value.get("errorStatus").and_then(Value::as_u32).unwrap_or(0);
                            let name = catalog::error_name(code)
                                .map(str::to_string)
                                .unwrap_or_else(|| format!("error-{code}"));
                            trace!(call = entry.rpc.name, error = %name, "error reply complete");
                            let _ = entry.resolver.send(Err(Error::Request { code, name, status }));
                        }
                    }
                }
                ReadState::Async { desc, mut parser } => match parser.advance(&mut self.queue) {
                    Err(e) => return Err(Error::Protocol(e)),
                    Ok(ParseProgress::Incomplete) => {
                        self.read = ReadState::Async { desc, parser };
                        return Ok(());
                    }
                    Ok(ParseProgress::Complete(value)) => {
                        trace!(event = desc.name, "asynchronous message");
                        signals.push(Signal::AsyncEvent {
                            name: desc.name,
                            value,
                        });
                    }
                },
                ReadState::SkipAsync { mut remaining } => {
                    while remaining > 0 {
                        if self.queue.pop_front().is_none() {
                            self.read = ReadState::SkipAsync { remaining };
                            return Ok(());
                        }
                        remaining -= 1;
                    }
                }
            }
        }
    }

    /// Complete every outstanding resolver with a failure, including the one
    /// whose reply is mid-parse.
    fn fail_all(&mut self, make: impl Fn() -> Error) {
        match std::mem::replace(&mut self.read, ReadState::Idle) {
            ReadState::Reply { entry, .. } | ReadState::ErrorReply { entry, .. } => {
                let _ = entry.resolver.send(Err(make()));
            }
            _ => {}
        }
        for (_, entry) in self.in_flight.drain() {
            let _ = entry.resolver.send(Err(make()));
        }
        self.queue.clear();
    }
}

fn protocol(message: &'static str) -> Error {
    Error::Protocol(ParseError::Protocol(message))
}

/// Rebuild a fatal error for fan-out to every pending resolver.
fn replicate_fatal(error: &Error) -> Error {
    match error {
        Error::Protocol(e) => Error::Protocol(e.clone()),
        Error::Server(text) => Error::Server(text.clone()),
        _ => Error::Closed,
    }
}

fn pop_header_int(queue: &mut VecDeque<Token>) -> Result<u32, Error> {
    match queue.pop_front() {
        Some(Token::Int { value, .. }) => {
            u32::try_from(value).map_err(|_| protocol("header number out of range"))
        }
        _ => Err(protocol("expected integer in message header")),
    }
}
