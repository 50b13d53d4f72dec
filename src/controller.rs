//! The bus controller, everything the application talks to.
//!
//! ```no_run
//! use cubby_bus::config::IniFile;
//! use cubby_bus::scheduler::{IoTransport, SchedulerConfig};
//! use cubby_bus::Controller;
//! use std::net::TcpStream;
//!
//! let stream = TcpStream::connect("localhost:5000").unwrap();
//! stream.set_read_timeout(Some(std::time::Duration::from_millis(100))).unwrap();
//! let mut controller = Controller::new(
//!     IoTransport::new(stream),
//!     IniFile::new("bus.ini"),
//!     SchedulerConfig::default(),
//! );
//! controller.run().unwrap();
//! ```

use std::io;

use log::info;
use snafu::{ResultExt, Snafu};

use crate::command::{self, LcdCommand};
use crate::config::{self, ConfigStore, CubbyInfo};
use crate::frame::{self, FrameBytes};
use crate::registry::{Device, DeviceRegistry, Update, BOX_COUNT, MAT_COUNT};
use crate::scheduler::{self, PollScheduler, SchedulerConfig, Tick, Transport};
use crate::types::{DeviceAddress, McuFamily};

/// Error type for this module
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Polling failed: {}", source))]
    Bus { source: scheduler::Error },
    #[snafu(display("Could not build frame: {}", source))]
    Encode { source: frame::Error },
    #[snafu(display("Sending on the bus failed: {}", source))]
    Send { source: io::Error },
    #[snafu(display("Could not store setting: {}", source))]
    Config { source: config::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Owns the registry, the polling loop, the bus and the configuration store.
#[derive(Debug)]
pub struct Controller<T, S> {
    registry: DeviceRegistry,
    scheduler: PollScheduler,
    transport: T,
    store: S,
}

impl<T, S> Controller<T, S>
where
    T: Transport,
    S: ConfigStore,
{
    /// Create a controller, loading device identities and calibration from
    /// `store`.
    pub fn new(transport: T, store: S, scheduler_config: SchedulerConfig) -> Self {
        let registry = config::load_registry(&store);
        let mats = registry.mats().iter().filter(|m| m.mat_id.is_assigned()).count();
        info!("loaded configuration, {} of {} mats assigned", mats, MAT_COUNT);
        Self {
            registry,
            scheduler: PollScheduler::new(scheduler_config),
            transport,
            store,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Run one iteration of the polling loop.
    pub fn tick(&mut self) -> Result<Tick> {
        self.scheduler
            .tick(&mut self.registry, &mut self.transport)
            .context(BusSnafu)
    }

    /// Poll forever. Only returns on a bus error.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.tick()?;
        }
    }

    fn send(&mut self, built: Result<FrameBytes, frame::Error>) -> Result<()> {
        let data = built.context(EncodeSnafu)?;
        self.transport.send(&data).context(SendSnafu)?;
        self.scheduler.bus_busy();
        Ok(())
    }

    /// Switch the cubby LEDs of a mat, see [`command::set_led`].
    pub fn set_led(&mut self, mat_id: DeviceAddress, mask: u8) -> Result<()> {
        self.send(command::set_led(mat_id, mask))?;
        if let Some(index) = self.registry.find_mat(mat_id) {
            let _ = self.registry.set_led(index, mask);
        }
        Ok(())
    }

    pub fn set_box_led(&mut self, box_id: DeviceAddress, enable: u32, value: u32) -> Result<()> {
        self.send(command::set_box_led(box_id, enable, value))
    }

    /// Give the unassigned device on the bus the address `new_id`.
    pub fn assign_device_id(&mut self, family: McuFamily, new_id: DeviceAddress) -> Result<()> {
        info!("assigning id {:#06X} to {:?} device", *new_id, family);
        self.send(command::assign_id(family, new_id))
    }

    /// Ask the device on the bus for its id. The answer shows up in
    /// [`DeviceRegistry::captured_id`] after a later tick.
    pub fn request_device_id(&mut self, family: McuFamily) -> Result<()> {
        self.send(command::request_id(family))
    }

    pub fn send_lcd(&mut self, lcd_id: DeviceAddress, lcd_command: &LcdCommand) -> Result<()> {
        self.send(command::lcd(lcd_id, lcd_command))
    }

    pub fn set_mat_identity(&mut self, index: usize, mat_id: DeviceAddress) -> Result<Update> {
        let update = self.registry.set_mat_identity(index, mat_id);
        if update.is_applied() {
            config::store_mat_identity(&mut self.store, index, mat_id).context(ConfigSnafu)?;
        }
        Ok(update)
    }

    pub fn set_mat_display(&mut self, index: usize, lcd_id: DeviceAddress) -> Result<Update> {
        let update = self.registry.set_mat_display(index, lcd_id);
        if update.is_applied() {
            config::store_mat_display(&mut self.store, index, lcd_id).context(ConfigSnafu)?;
        }
        Ok(update)
    }

    pub fn set_box_identity(&mut self, index: usize, box_id: DeviceAddress) -> Result<Update> {
        let update = self.registry.set_box_identity(index, box_id);
        if update.is_applied() {
            config::store_box_identity(&mut self.store, index, box_id).context(ConfigSnafu)?;
        }
        Ok(update)
    }

    /// Tare every mat slot and store the new baselines.
    pub fn tare_all(&mut self) -> Result<()> {
        self.registry.tare_all();
        for index in 0..MAT_COUNT {
            config::store_peeling(&mut self.store, &self.registry, Device::Mat(index))
                .context(ConfigSnafu)?;
        }
        Ok(())
    }

    /// Tare every box cup and store the new baselines.
    pub fn tare_boxes(&mut self) -> Result<()> {
        self.registry.tare_boxes();
        for index in 0..BOX_COUNT {
            config::store_peeling(&mut self.store, &self.registry, Device::Box(index))
                .context(ConfigSnafu)?;
        }
        Ok(())
    }

    /// Change the description, stock limits and calibration of a slot.
    pub fn update_cubby(&mut self, device: Device, slot: usize, info: &CubbyInfo) -> Result<Update> {
        let update = self
            .registry
            .set_metadata(device, slot, info.metadata.clone());
        if !update.is_applied() {
            return Ok(update);
        }
        let _ = self.registry.set_quantity_bounds(
            device,
            slot,
            info.min_qty,
            info.max_qty,
            info.reorder_qty,
        );
        let _ = self.registry.set_calibration(
            device,
            slot,
            info.single_item_weight,
            info.weight_per_adc,
        );
        config::store_cubby_info(&mut self.store, device, slot, info).context(ConfigSnafu)?;
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use crate::frame::decode;
    use crate::registry::CubbyMetadata;
    use crate::types::{addr, Opcode};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Recorder {
        sent: Vec<Vec<u8>>,
    }

    impl Transport for Recorder {
        fn send(&mut self, data: &[u8]) -> io::Result<()> {
            self.sent.push(data.to_vec());
            Ok(())
        }

        fn receive(&mut self, _buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
            Ok(0)
        }
    }

    fn controller() -> Controller<Recorder, MemoryStore> {
        Controller::new(
            Recorder::default(),
            MemoryStore::new(),
            SchedulerConfig::default(),
        )
    }

    #[test]
    fn test_identity_is_persisted() {
        let mut c = controller();
        assert_eq!(c.set_mat_identity(1, addr(0x0202)).unwrap(), Update::Applied);
        assert_eq!(c.set_mat_display(1, addr(13)).unwrap(), Update::Applied);
        assert_eq!(c.set_box_identity(0, addr(0x0300)).unwrap(), Update::Applied);
        assert_eq!(c.store().get("MATL1R", config::UUID).as_deref(), Some("514"));
        assert_eq!(c.store().get("MATL1R", config::LCD_ID).as_deref(), Some("13"));
        assert_eq!(c.store().get("BOX1", config::UUID).as_deref(), Some("768"));

        assert_eq!(
            c.set_mat_identity(MAT_COUNT, addr(1)).unwrap(),
            Update::Ignored
        );
        assert_eq!(c.store().get("MATL6L", config::UUID), None);
    }

    #[test]
    fn test_commands_hold_off_polling() {
        let mut c = controller();
        let _ = c.set_mat_identity(0, addr(0x0201)).unwrap();
        for _ in 0..4 {
            assert_eq!(c.tick().unwrap(), Tick::Idle);
        }
        c.set_led(addr(0x0201), 0x11).unwrap();
        assert_eq!(c.scheduler().cursor().idle_ticks, 0);
        assert!(c.registry().mat(0).unwrap().cubbies[0].led_on);
        for _ in 0..4 {
            assert_eq!(c.tick().unwrap(), Tick::Idle);
        }
        assert!(matches!(c.tick().unwrap(), Tick::Polled { mat: 0, .. }));

        let sent = &c.transport_mut().sent;
        assert_eq!(sent.len(), 2);
        assert_eq!(decode(&sent[0]).unwrap().opcode(), Some(Opcode::Led));
        assert_eq!(decode(&sent[1]).unwrap().opcode(), Some(Opcode::Weight));
    }

    #[test]
    fn test_tare_all_persists_baselines() {
        let mut c = controller();
        let _ = c.registry.record_readings(Device::Mat(1), &[10, 20, 30, 40]);
        c.tare_all().unwrap();
        assert_eq!(
            c.store().get("CubbyR1C7", config::ADC_PEELING).as_deref(),
            Some("30")
        );
        assert_eq!(
            c.store().get("CubbyR1C1", config::ADC_PEELING).as_deref(),
            Some("0")
        );
        c.tare_boxes().unwrap();
        assert_eq!(
            c.store().get("CupB4C24", config::ADC_PEELING).as_deref(),
            Some("0")
        );
    }

    #[test]
    fn test_update_cubby() {
        let mut c = controller();
        let info = CubbyInfo {
            metadata: CubbyMetadata {
                desc1: "M6 bolts".to_string(),
                ..CubbyMetadata::default()
            },
            max_qty: 50,
            single_item_weight: 4.0,
            weight_per_adc: 1.0,
            ..CubbyInfo::default()
        };
        assert!(c.update_cubby(Device::Mat(0), 2, &info).unwrap().is_applied());
        let cubby = &c.registry().mat(0).unwrap().cubbies[2];
        assert_eq!(cubby.metadata.desc1, "M6 bolts");
        assert_eq!(cubby.max_qty, 50);
        assert_eq!(cubby.single_item_weight, 4.0);
        assert_eq!(c.store().get("CubbyR1C3", config::DESC1).as_deref(), Some("M6 bolts"));
        assert_eq!(c.store().get("CubbyR1C3", config::WEIGHT_SINGLE).as_deref(), Some("4"));

        assert_eq!(
            c.update_cubby(Device::Mat(0), 4, &info).unwrap(),
            Update::Ignored
        );
        assert_eq!(c.store().get("CubbyR1C5", config::DESC1), None);
    }

    #[test]
    fn test_id_commands() {
        let mut c = controller();
        c.assign_device_id(McuFamily::Holtek, addr(0x0203)).unwrap();
        c.request_device_id(McuFamily::Stm32).unwrap();
        c.set_box_led(addr(0x0300), 1, 1).unwrap();
        let sent = &c.transport_mut().sent;
        let frames: Vec<_> = sent.iter().map(|b| decode(b).unwrap()).collect();
        assert_eq!(frames[0].opcode, 0xFF);
        assert_eq!(frames[0].payload.as_slice(), &[0x02, 0x03]);
        assert_eq!(frames[1].opcode, 0xFE);
        assert_eq!(frames[2].target, addr(0x0300));
    }
}
