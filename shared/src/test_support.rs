// Test doubles for the region, radio, broker and delay seams

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_storage::{ReadStorage, Storage};

use crate::radio::{AccessPoint, Broker, ConnectError, QoS, Radio, StaticIp};

#[derive(Debug)]
pub struct RegionError;

#[derive(Default)]
struct RegionState {
    bytes: Vec<u8>,
    fail_reads: bool,
    fail_writes: bool,
    writes: usize,
}

/// In-memory region; clones share the same bytes so a test can inspect
/// what the store wrote after handing it over.
#[derive(Clone, Default)]
pub struct MemRegion {
    state: Rc<RefCell<RegionState>>,
}

impl MemRegion {
    pub fn new(size: usize) -> Self {
        let region = Self::default();
        region.state.borrow_mut().bytes = vec![0; size];
        region
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.state.borrow().bytes.clone()
    }

    pub fn set_bytes(&self, bytes: &[u8]) {
        self.state.borrow_mut().bytes = bytes.to_vec();
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.borrow_mut().fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.borrow_mut().fail_writes = fail;
    }

    pub fn writes(&self) -> usize {
        self.state.borrow().writes
    }
}

impl ReadStorage for MemRegion {
    type Error = RegionError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let state = self.state.borrow();
        let start = offset as usize;
        let end = start + bytes.len();
        if state.fail_reads || end > state.bytes.len() {
            return Err(RegionError);
        }
        bytes.copy_from_slice(&state.bytes[start..end]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.state.borrow().bytes.len()
    }
}

impl Storage for MemRegion {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        let start = offset as usize;
        let end = start + bytes.len();
        if state.fail_writes || end > state.bytes.len() {
            return Err(RegionError);
        }
        state.bytes[start..end].copy_from_slice(bytes);
        state.writes += 1;
        Ok(())
    }
}

/// Radio whose association outcome is scripted per `associate` call.
///
/// Each scripted entry is `Some(n)`: associated after `n` failed polls, or
/// `None`: never associates. An empty script never associates either.
#[derive(Default)]
pub struct MockRadio {
    pub ap: AccessPoint,
    pub static_ip: Option<StaticIp>,
    pub associate_calls: Vec<Option<AccessPoint>>,
    pub polls: u32,
    pub disassociations: usize,
    pub sleeps: usize,
    pub wakes: usize,
    script: VecDeque<Option<u32>>,
    pending: Option<u32>,
    polls_this_attempt: u32,
    up: bool,
}

impl MockRadio {
    pub fn script_association(&mut self, outcome: Option<u32>) {
        self.script.push_back(outcome);
    }
}

impl Radio for MockRadio {
    fn configure_static_ip(&mut self, ip: &StaticIp) -> bool {
        self.static_ip = Some(*ip);
        true
    }

    fn associate(&mut self, _ssid: &str, _password: &str, hint: Option<AccessPoint>) -> bool {
        self.associate_calls.push(hint);
        self.pending = self.script.pop_front().flatten();
        self.polls_this_attempt = 0;
        self.up = false;
        true
    }

    fn is_associated(&mut self) -> bool {
        self.polls += 1;
        if let Some(needed) = self.pending {
            if self.polls_this_attempt >= needed {
                self.up = true;
            }
        }
        self.polls_this_attempt += 1;
        self.up
    }

    fn disassociate(&mut self) {
        self.disassociations += 1;
        self.up = false;
        self.pending = None;
    }

    fn sleep_radio(&mut self) {
        self.sleeps += 1;
    }

    fn wake_radio(&mut self) {
        self.wakes += 1;
    }

    fn access_point(&self) -> Option<AccessPoint> {
        self.up.then_some(self.ap)
    }
}

/// Broker with scripted connect results; an exhausted script refuses
#[derive(Default)]
pub struct MockBroker {
    pub connect_calls: usize,
    pub disconnects: usize,
    pub is_connected: bool,
    pub reject_publish: bool,
    pub published: Vec<(String, String, Option<QoS>)>,
    script: VecDeque<Result<(), ConnectError>>,
}

impl MockBroker {
    pub fn script_connect(&mut self, result: Result<(), ConnectError>) {
        self.script.push_back(result);
    }
}

impl Broker for MockBroker {
    fn connect(&mut self) -> Result<(), ConnectError> {
        self.connect_calls += 1;
        let result = self
            .script
            .pop_front()
            .unwrap_or(Err(ConnectError::ConnectionFailed));
        self.is_connected = result.is_ok();
        result
    }

    fn connected(&self) -> bool {
        self.is_connected
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
        self.is_connected = false;
    }

    fn publish(&mut self, topic: &str, payload: &str, qos: Option<QoS>) -> bool {
        if self.reject_publish {
            return false;
        }
        self.published
            .push((topic.to_string(), payload.to_string(), qos));
        true
    }
}

/// Records every delay instead of waiting
#[derive(Default)]
pub struct RecordingDelay {
    pub delays_ms: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.delays_ms.push(ns / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delays_ms.push(ms);
    }
}
