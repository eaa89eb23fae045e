//! Shared helpers for driving a TcpHandler with scripted sockets

#![allow(dead_code)]

use std::sync::Arc;

use doip_transport::testing::{ManualTimers, ScriptedSocket};
use doip_transport::uds::mock::MockTransportMgr;
use doip_transport::{DoIpConfig, ReadStatus, TcpHandler};

pub const TESTER: u16 = 0x0E80;
pub const ENTITY: u16 = 0x0010;
pub const HANDLER_ID: u8 = 3;

pub struct Harness {
    pub handler: TcpHandler<ScriptedSocket>,
    pub mgr: Arc<MockTransportMgr>,
    pub timers: Arc<ManualTimers>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(DoIpConfig::default())
    }

    pub fn with_config(config: DoIpConfig) -> Self {
        let mgr = Arc::new(MockTransportMgr::new());
        let timers = Arc::new(ManualTimers::new());
        let handler = TcpHandler::new(config, HANDLER_ID, mgr.clone(), timers.clone()).unwrap();
        Self {
            handler,
            mgr,
            timers,
        }
    }

    /// Accept a new scripted connection
    pub fn connect(&mut self) -> (usize, ScriptedSocket) {
        let socket = ScriptedSocket::new();
        let slot = self.handler.on_accept(socket.clone()).unwrap();
        (slot, socket)
    }

    /// Read until the channel runs dry or closes
    pub fn pump(&mut self, slot: usize) -> ReadStatus {
        loop {
            let status = self.handler.on_readable(slot);
            if status != ReadStatus::Progress {
                return status;
            }
        }
    }

    pub fn feed(&mut self, slot: usize, socket: &ScriptedSocket, bytes: &[u8]) -> ReadStatus {
        socket.push(bytes.to_vec());
        self.pump(slot)
    }

    /// Connect and activate routing for `source_address`
    pub fn activate(&mut self, source_address: u16) -> (usize, ScriptedSocket) {
        let (slot, socket) = self.connect();
        self.feed(slot, &socket, &routing_activation_request(source_address, 0x00));
        socket.clear_sent();
        (slot, socket)
    }
}

pub fn header(payload_type: u16, payload_length: u32) -> Vec<u8> {
    let mut bytes = vec![0x02, 0xFD];
    bytes.extend_from_slice(&payload_type.to_be_bytes());
    bytes.extend_from_slice(&payload_length.to_be_bytes());
    bytes
}

pub fn routing_activation_request(source_address: u16, activation_type: u8) -> Vec<u8> {
    let mut bytes = header(0x0005, 7);
    bytes.extend_from_slice(&source_address.to_be_bytes());
    bytes.push(activation_type);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes
}

pub fn diagnostic_message(source_address: u16, target_address: u16, uds: &[u8]) -> Vec<u8> {
    let mut bytes = header(0x8001, (uds.len() + 4) as u32);
    bytes.extend_from_slice(&source_address.to_be_bytes());
    bytes.extend_from_slice(&target_address.to_be_bytes());
    bytes.extend_from_slice(uds);
    bytes
}

pub fn alive_check_response(source_address: u16) -> Vec<u8> {
    let mut bytes = header(0x0008, 2);
    bytes.extend_from_slice(&source_address.to_be_bytes());
    bytes
}
