//! Simulated multi-drop RS-485 line shared between threads.

use std::collections::VecDeque;
use std::io::{Error, ErrorKind};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

type BusT = Arc<Mutex<VecDeque<u8>>>;

#[derive(Default)]
pub struct RS485Bus {
    controllers: Mutex<Vec<Weak<BusInterfaceLink>>>,
    devices: Mutex<Vec<Weak<BusInterfaceLink>>>,
    eof: AtomicBool,
}

impl RS485Bus {
    pub fn new() -> Arc<RS485Bus> {
        Default::default()
    }

    /// Make blocked and future reads on an empty line return 0 bytes.
    pub fn disconnect(&self) {
        self.eof.store(true, SeqCst);
        RS485Bus::send(&self.devices, &[]);
        RS485Bus::send(&self.controllers, &[]);
    }

    pub fn new_controller_interface(self: &Arc<Self>) -> BusInterface {
        let link = Arc::new(BusInterfaceLink {
            is_controller: true,
            rx: Default::default(),
            rx_condvar: Condvar::new(),
        });
        self.controllers.lock().unwrap().push(Arc::downgrade(&link));
        BusInterface::new(Arc::clone(self), link)
    }

    pub fn new_device_interface(self: &Arc<Self>) -> BusInterface {
        let link = Arc::new(BusInterfaceLink {
            is_controller: false,
            rx: Default::default(),
            rx_condvar: Condvar::new(),
        });
        self.devices.lock().unwrap().push(Arc::downgrade(&link));
        BusInterface::new(Arc::clone(self), link)
    }

    fn send(links: &Mutex<Vec<Weak<BusInterfaceLink>>>, data: &[u8]) {
        let links = links.lock().unwrap();
        for weak in links.iter() {
            if let Some(link) = weak.upgrade() {
                link.rx.lock().unwrap().extend(data.iter().copied());
                link.rx_condvar.notify_all();
            }
        }
    }
}

pub struct BusInterface {
    bus: Arc<RS485Bus>,
    link: Arc<BusInterfaceLink>,
    pub timeout: Duration,
    pub do_read_error: bool,
    pub do_write_error: bool,
}

struct BusInterfaceLink {
    is_controller: bool,
    rx: BusT,
    rx_condvar: Condvar,
}

impl BusInterface {
    fn new(bus: Arc<RS485Bus>, link: Arc<BusInterfaceLink>) -> BusInterface {
        BusInterface {
            bus,
            link,
            timeout: Duration::from_millis(100),
            do_read_error: false,
            do_write_error: false,
        }
    }

    fn drain_into(rx: &mut VecDeque<u8>, buf: &mut [u8]) -> usize {
        let len = rx.len().min(buf.len());
        for (dst, src) in buf.iter_mut().zip(rx.drain(..len)) {
            *dst = src;
        }
        len
    }
}

impl std::io::Read for BusInterface {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            panic!("Testsuite called read with zero length buffer.")
        }
        if self.do_read_error {
            self.do_read_error = false;
            return Err(Error::new(ErrorKind::PermissionDenied, "IO read error"));
        }

        let rx = self.link.rx.lock().expect("Read mutex is poisoned");
        let mut rx = if rx.is_empty() && !self.bus.eof.load(SeqCst) {
            self.link
                .rx_condvar
                .wait_timeout(rx, self.timeout)
                .expect("Mutex lock failed")
                .0
        } else {
            rx
        };

        if !rx.is_empty() {
            Ok(Self::drain_into(&mut rx, buf))
        } else if self.bus.eof.load(SeqCst) {
            Ok(0)
        } else {
            Err(Error::new(ErrorKind::TimedOut, "IO read timeout"))
        }
    }
}

impl std::io::Write for BusInterface {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.do_write_error {
            self.do_write_error = false;
            return Err(Error::new(ErrorKind::PermissionDenied, "IO write error"));
        }
        if self.link.is_controller {
            RS485Bus::send(&self.bus.devices, buf);
        } else {
            RS485Bus::send(&self.bus.controllers, buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
