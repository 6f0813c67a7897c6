//! Simulated Modbus RTU slave
//!
//! A register-map slave served from the peer end of an in-memory bus link
//! (see [`zapline_comlink::BusLink::memory`]). Used for bench setups without
//! hardware and for integration tests. The fault plan reproduces the failure
//! modes a real bus exhibits: silent slaves, corrupted frames, exception
//! responses.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tracing::debug;

use super::constants::{
    EXCEPTION_BIT, FC_READ_HOLDING_REGISTERS, FC_WRITE_MULTIPLE_REGISTERS,
    FC_WRITE_SINGLE_REGISTER, MAX_FRAME_SIZE, MIN_FRAME_SIZE,
};
use super::frame::crc16;

/// Planned misbehavior for a matched request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    /// Swallow the request; the master will hit its RX timeout
    Mute,
    /// Respond normally but with a corrupted CRC trailer
    CorruptCrc,
    /// Reject with the given exception code
    Exception(u8),
    /// Answer an FC03 read with an inflated byte-count field
    WrongByteCount,
}

#[derive(Debug, Default)]
struct SimState {
    registers: HashMap<u16, u16>,
    /// Every accepted register write, in arrival order
    write_log: Vec<(u16, u16)>,
    /// Consumed by the next request regardless of shape
    one_shot: Option<SimFault>,
    /// Applied to every request matching (function code, register)
    keyed: HashMap<(u8, u16), SimFault>,
}

/// Control handle for a running simulated slave
#[derive(Debug)]
pub struct SimSlave {
    slave_id: u8,
    state: Arc<Mutex<SimState>>,
    task: JoinHandle<()>,
}

impl SimSlave {
    /// Spawn a slave answering at `slave_id` on the far end of a memory link
    pub fn spawn(slave_id: u8, link: DuplexStream) -> Self {
        let state = Arc::new(Mutex::new(SimState::default()));
        let task = tokio::spawn(run(slave_id, state.clone(), link));
        Self {
            slave_id,
            state,
            task,
        }
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    pub fn set_register(&self, reg: u16, value: u16) {
        self.state.lock().registers.insert(reg, value);
    }

    pub fn register(&self, reg: u16) -> Option<u16> {
        self.state.lock().registers.get(&reg).copied()
    }

    /// Accepted writes in arrival order
    pub fn write_log(&self) -> Vec<(u16, u16)> {
        self.state.lock().write_log.clone()
    }

    /// Fault the next request, whatever it is
    pub fn inject_fault(&self, fault: SimFault) {
        self.state.lock().one_shot = Some(fault);
    }

    /// Fault every request with this function code and register
    pub fn fail_register(&self, function_code: u8, reg: u16, fault: SimFault) {
        self.state.lock().keyed.insert((function_code, reg), fault);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.one_shot = None;
        state.keyed.clear();
    }
}

impl Drop for SimSlave {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(slave_id: u8, state: Arc<Mutex<SimState>>, mut link: DuplexStream) {
    let mut buf = [0u8; MAX_FRAME_SIZE];
    loop {
        let n = match link.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let frame = &buf[..n];

        // Requests the master would never have sent are bus noise to a
        // real slave: ignore silently. The shortest valid request here
        // (FC03/FC06) is 8 bytes.
        if frame.len() < MIN_FRAME_SIZE + 4 {
            continue;
        }
        if crc16(&frame[..n - 2]) != u16::from_le_bytes([frame[n - 2], frame[n - 1]]) {
            continue;
        }
        if frame[0] != slave_id {
            continue;
        }

        let response = state.lock().handle(slave_id, &frame[1..n - 2]);
        match response {
            Some(resp) => {
                if link.write_all(&resp).await.is_err() {
                    return;
                }
            },
            None => debug!("sim slave {slave_id}: muted request"),
        }
    }
}

impl SimState {
    fn take_fault(&mut self, function_code: u8, reg: u16) -> Option<SimFault> {
        if let Some(fault) = self.one_shot.take() {
            return Some(fault);
        }
        self.keyed.get(&(function_code, reg)).copied()
    }

    fn handle(&mut self, slave_id: u8, pdu: &[u8]) -> Option<Vec<u8>> {
        let function_code = pdu[0];
        let reg = u16::from_be_bytes([pdu[1], pdu[2]]);

        match self.take_fault(function_code, reg) {
            Some(SimFault::Mute) => return None,
            Some(SimFault::Exception(code)) => {
                return Some(seal(vec![slave_id, function_code | EXCEPTION_BIT, code]));
            },
            Some(SimFault::CorruptCrc) => {
                let mut resp = self.answer(slave_id, function_code, reg, pdu)?;
                let last = resp.len() - 1;
                resp[last] ^= 0xFF;
                return Some(resp);
            },
            Some(SimFault::WrongByteCount) => {
                if function_code == FC_READ_HOLDING_REGISTERS {
                    let count = u16::from_be_bytes([pdu[3], pdu[4]]);
                    let mut body = vec![slave_id, function_code, (count * 2) as u8 + 2];
                    for i in 0..count {
                        let value = self.registers.get(&(reg + i)).copied().unwrap_or(0);
                        body.extend_from_slice(&value.to_be_bytes());
                    }
                    return Some(seal(body));
                }
            },
            None => {},
        }

        self.answer(slave_id, function_code, reg, pdu)
    }

    fn answer(&mut self, slave_id: u8, function_code: u8, reg: u16, pdu: &[u8]) -> Option<Vec<u8>> {
        match function_code {
            FC_READ_HOLDING_REGISTERS => {
                let count = u16::from_be_bytes([pdu[3], pdu[4]]);
                let mut body = vec![slave_id, function_code, (count * 2) as u8];
                for i in 0..count {
                    let value = self.registers.get(&(reg + i)).copied().unwrap_or(0);
                    body.extend_from_slice(&value.to_be_bytes());
                }
                Some(seal(body))
            },
            FC_WRITE_SINGLE_REGISTER => {
                let value = u16::from_be_bytes([pdu[3], pdu[4]]);
                self.registers.insert(reg, value);
                self.write_log.push((reg, value));
                // FC06 acknowledgement echoes the request
                let mut body = vec![slave_id];
                body.extend_from_slice(pdu);
                Some(seal(body))
            },
            FC_WRITE_MULTIPLE_REGISTERS => {
                let count = u16::from_be_bytes([pdu[3], pdu[4]]);
                for i in 0..count {
                    let offset = 6 + (i as usize) * 2;
                    let value = u16::from_be_bytes([pdu[offset], pdu[offset + 1]]);
                    self.registers.insert(reg + i, value);
                    self.write_log.push((reg + i, value));
                }
                let mut body = vec![slave_id, function_code];
                body.extend_from_slice(&reg.to_be_bytes());
                body.extend_from_slice(&count.to_be_bytes());
                Some(seal(body))
            },
            _ => Some(seal(vec![slave_id, function_code | EXCEPTION_BIT, 0x01])),
        }
    }
}

/// Append the CRC trailer, low byte first
fn seal(mut body: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&body);
    body.extend_from_slice(&crc.to_le_bytes());
    body
}
