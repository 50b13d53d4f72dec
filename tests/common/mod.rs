#![allow(dead_code)]

pub mod sync;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Error, ErrorKind};
use std::rc::Rc;

use cubby_bus::frame::encode_reply;
use cubby_bus::{addr, Opcode};

/// Scripted serial line. Each read returns the next chunk, an exhausted
/// script reads as a timeout.
pub struct SerialInterface {
    rx: VecDeque<Vec<u8>>,
    pub tx: Vec<Vec<u8>>,
    do_read_error: bool,
    do_write_error: bool,
}

pub struct SerialIOPlane(Rc<RefCell<SerialInterface>>);

impl SerialIOPlane {
    pub fn new(serial_if: &Rc<RefCell<SerialInterface>>) -> SerialIOPlane {
        SerialIOPlane(serial_if.clone())
    }
}

impl SerialInterface {
    pub fn new(rx: &[&[u8]]) -> Rc<RefCell<SerialInterface>> {
        Rc::new(RefCell::new(SerialInterface {
            rx: rx.iter().map(|chunk| chunk.to_vec()).collect(),
            tx: Vec::new(),
            do_read_error: false,
            do_write_error: false,
        }))
    }

    pub fn push_rx(&mut self, data: &[u8]) {
        self.rx.push_back(data.to_vec());
    }

    pub fn trigger_write_error(&mut self) {
        self.do_write_error = true;
    }

    pub fn trigger_read_error(&mut self) {
        self.do_read_error = true;
    }
}

impl std::io::Read for SerialIOPlane {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        if inner.do_read_error {
            inner.do_read_error = false;
            return Err(Error::new(ErrorKind::PermissionDenied, "IO read error"));
        }
        match inner.rx.pop_front() {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => Err(Error::new(ErrorKind::TimedOut, "IO read timeout")),
        }
    }
}

impl std::io::Write for SerialIOPlane {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        if inner.do_write_error {
            inner.do_write_error = false;
            Err(Error::new(ErrorKind::PermissionDenied, "IO write error"))
        } else {
            inner.tx.push(buf.to_vec());
            Ok(buf.len())
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Bytes of a weight reply from the mat at `source`.
pub fn weight_reply(source: u16, readings: [u32; 4]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(12);
    for raw in readings.iter() {
        payload.extend_from_slice(&raw.to_be_bytes()[1..]);
    }
    encode_reply(Opcode::Weight, addr(source), &payload)
        .unwrap()
        .to_vec()
}
