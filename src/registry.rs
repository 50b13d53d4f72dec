//! In-memory table of the mats and boxes on the bus.
//!
//! The tables have a fixed size. Setters taking an index never fail: an index
//! outside the table is reported as [`Update::Ignored`] and nothing changes,
//! since indices usually come straight from the application layer.

use log::debug;

use crate::types::DeviceAddress;
use crate::weight;

pub const MAT_COUNT: usize = 10;
pub const CUBBY_COUNT: usize = 4;
pub const BOX_COUNT: usize = 4;
pub const CUP_COUNT: usize = 24;

/// Tare baseline of a slot that has never been tared, mid-scale of the ADC.
pub const DEFAULT_ADC_PEELING: u32 = 0x80000;
pub const DEFAULT_SINGLE_ITEM_WEIGHT: f32 = 12.5;
/// Grams per ADC count of the stock load cells.
pub const DEFAULT_WEIGHT_PER_ADC: f32 = 0.93361;

/// Outcome of a registry setter.
#[must_use]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Update {
    Applied,
    /// The device or slot index was out of range, nothing changed.
    Ignored,
}

impl Update {
    pub fn is_applied(self) -> bool {
        self == Update::Applied
    }
}

impl<T> From<Option<T>> for Update {
    fn from(found: Option<T>) -> Self {
        match found {
            Some(_) => Update::Applied,
            None => Update::Ignored,
        }
    }
}

/// Free-text description of what's stored in a slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CubbyMetadata {
    pub location_id: String,
    pub product_num: String,
    pub desc1: String,
    pub desc2: String,
    pub picture: String,
}

/// One weighing channel: a mat cubby or a box cup.
#[derive(Debug, Clone, PartialEq)]
pub struct CubbySlot {
    pub adc_raw: u32,
    /// Tare baseline.
    pub adc_peeling: u32,
    pub weight_per_adc: f32,
    pub single_item_weight: f32,
    pub weight: f32,
    pub quantity: u32,
    pub min_qty: u32,
    pub max_qty: u32,
    pub reorder_qty: u32,
    pub metadata: CubbyMetadata,
    pub led_on: bool,
}

impl Default for CubbySlot {
    fn default() -> Self {
        Self {
            adc_raw: 0,
            adc_peeling: DEFAULT_ADC_PEELING,
            weight_per_adc: DEFAULT_WEIGHT_PER_ADC,
            single_item_weight: DEFAULT_SINGLE_ITEM_WEIGHT,
            weight: 0.0,
            quantity: 0,
            min_qty: 0,
            max_qty: 0,
            reorder_qty: 0,
            metadata: CubbyMetadata::default(),
            led_on: false,
        }
    }
}

impl CubbySlot {
    fn tare(&mut self) {
        self.adc_peeling = self.adc_raw;
        weight::update_slot(self);
    }
}

/// A mat with four cubbies and an optional display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mat {
    pub mat_id: DeviceAddress,
    /// Address of the LCD showing this mat, 0 if there is none.
    pub lcd_id: DeviceAddress,
    pub cubbies: [CubbySlot; CUBBY_COUNT],
}

/// A box with up to 24 cups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CupBox {
    pub box_id: DeviceAddress,
    pub cups: [CubbySlot; CUP_COUNT],
}

/// Selects the device a slot setter applies to, by table index.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Device {
    Mat(usize),
    Box(usize),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceRegistry {
    mats: [Mat; MAT_COUNT],
    boxes: [CupBox; BOX_COUNT],
    captured_id: Option<u32>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table index of the first mat with the given address.
    pub fn find_mat(&self, mat_id: DeviceAddress) -> Option<usize> {
        self.mats.iter().position(|mat| mat.mat_id == mat_id)
    }

    /// Table index of the first box with the given address.
    pub fn find_box(&self, box_id: DeviceAddress) -> Option<usize> {
        self.boxes.iter().position(|b| b.box_id == box_id)
    }

    pub fn mats(&self) -> &[Mat] {
        &self.mats
    }

    pub fn boxes(&self) -> &[CupBox] {
        &self.boxes
    }

    pub fn mat(&self, index: usize) -> Option<&Mat> {
        self.mats.get(index)
    }

    pub fn cup_box(&self, index: usize) -> Option<&CupBox> {
        self.boxes.get(index)
    }

    /// Slot of the mat with address `mat_id`.
    pub fn mat_slot(&self, mat_id: DeviceAddress, slot: usize) -> Option<&CubbySlot> {
        self.mats[self.find_mat(mat_id)?].cubbies.get(slot)
    }

    /// Cup of the box with address `box_id`.
    pub fn box_slot(&self, box_id: DeviceAddress, cup: usize) -> Option<&CubbySlot> {
        self.boxes[self.find_box(box_id)?].cups.get(cup)
    }

    /// `|adc_raw - adc_peeling|` of a mat slot, or 0 if there is no such slot.
    pub fn adc_delta(&self, mat_id: DeviceAddress, slot: usize) -> u32 {
        self.mat_slot(mat_id, slot).map_or(0, weight::adc_delta)
    }

    pub fn weight(&self, mat_id: DeviceAddress, slot: usize) -> Option<f32> {
        self.mat_slot(mat_id, slot).map(|s| s.weight)
    }

    pub fn quantity(&self, mat_id: DeviceAddress, slot: usize) -> Option<u32> {
        self.mat_slot(mat_id, slot).map(|s| s.quantity)
    }

    pub fn box_adc_raw(&self, box_id: DeviceAddress, cup: usize) -> Option<u32> {
        self.box_slot(box_id, cup).map(|s| s.adc_raw)
    }

    pub fn box_adc_peeling(&self, box_id: DeviceAddress, cup: usize) -> Option<u32> {
        self.box_slot(box_id, cup).map(|s| s.adc_peeling)
    }

    pub fn box_weight_per_adc(&self, box_id: DeviceAddress, cup: usize) -> Option<f32> {
        self.box_slot(box_id, cup).map(|s| s.weight_per_adc)
    }

    pub fn box_weight(&self, box_id: DeviceAddress, cup: usize) -> Option<f32> {
        self.box_slot(box_id, cup).map(|s| s.weight)
    }

    pub fn box_quantity(&self, box_id: DeviceAddress, cup: usize) -> Option<u32> {
        self.box_slot(box_id, cup).map(|s| s.quantity)
    }

    pub fn box_product_num(&self, box_id: DeviceAddress, cup: usize) -> Option<&str> {
        self.box_slot(box_id, cup)
            .map(|s| s.metadata.product_num.as_str())
    }

    /// The id reported by the last identity reply seen on the bus.
    pub fn captured_id(&self) -> Option<u32> {
        self.captured_id
    }

    pub fn capture_id(&mut self, id: u32) {
        self.captured_id = Some(id);
    }

    pub fn set_mat_identity(&mut self, index: usize, mat_id: DeviceAddress) -> Update {
        self.mats.get_mut(index).map(|mat| mat.mat_id = mat_id).into()
    }

    pub fn set_mat_display(&mut self, index: usize, lcd_id: DeviceAddress) -> Update {
        self.mats.get_mut(index).map(|mat| mat.lcd_id = lcd_id).into()
    }

    pub fn set_box_identity(&mut self, index: usize, box_id: DeviceAddress) -> Update {
        self.boxes.get_mut(index).map(|b| b.box_id = box_id).into()
    }

    fn slots_mut(&mut self, device: Device) -> Option<&mut [CubbySlot]> {
        match device {
            Device::Mat(index) => self.mats.get_mut(index).map(|m| &mut m.cubbies[..]),
            Device::Box(index) => self.boxes.get_mut(index).map(|b| &mut b.cups[..]),
        }
    }

    fn slot_mut(&mut self, device: Device, slot: usize) -> Option<&mut CubbySlot> {
        self.slots_mut(device)?.get_mut(slot)
    }

    /// Set the per-item weight and the grams per ADC count of a slot, and
    /// recompute its weight and quantity.
    pub fn set_calibration(
        &mut self,
        device: Device,
        slot: usize,
        single_item_weight: f32,
        weight_per_adc: f32,
    ) -> Update {
        self.slot_mut(device, slot)
            .map(|s| {
                s.single_item_weight = single_item_weight;
                s.weight_per_adc = weight_per_adc;
                weight::update_slot(s);
            })
            .into()
    }

    pub fn set_quantity_bounds(
        &mut self,
        device: Device,
        slot: usize,
        min_qty: u32,
        max_qty: u32,
        reorder_qty: u32,
    ) -> Update {
        self.slot_mut(device, slot)
            .map(|s| {
                s.min_qty = min_qty;
                s.max_qty = max_qty;
                s.reorder_qty = reorder_qty;
            })
            .into()
    }

    pub fn set_metadata(&mut self, device: Device, slot: usize, metadata: CubbyMetadata) -> Update {
        self.slot_mut(device, slot)
            .map(|s| s.metadata = metadata)
            .into()
    }

    /// Set the tare baseline of a slot, as loaded from configuration.
    pub fn set_peeling(&mut self, device: Device, slot: usize, adc_peeling: u32) -> Update {
        self.slot_mut(device, slot)
            .map(|s| {
                s.adc_peeling = adc_peeling;
                weight::update_slot(s);
            })
            .into()
    }

    /// Record the LED mask last sent to a mat. Bit `4 + n` enables cubby `n`,
    /// bit `n` is its new state. Cubbies that aren't enabled keep theirs.
    pub fn set_led(&mut self, index: usize, mask: u8) -> Update {
        self.mats
            .get_mut(index)
            .map(|mat| {
                for (n, cubby) in mat.cubbies.iter_mut().enumerate() {
                    if mask & (0x10 << n) != 0 {
                        cubby.led_on = mask & (1 << n) != 0;
                    }
                }
            })
            .into()
    }

    /// Store fresh ADC readings for a device, starting at slot 0, and
    /// recompute its derived values. Extra readings are dropped.
    pub fn record_readings(&mut self, device: Device, readings: &[u32]) -> Update {
        self.slots_mut(device)
            .map(|slots| {
                for (slot, raw) in slots.iter_mut().zip(readings) {
                    slot.adc_raw = *raw;
                }
                weight::update(slots);
            })
            .into()
    }

    /// Take the current reading of every mat slot as its zero point.
    pub fn tare_all(&mut self) {
        debug!("taring all mats");
        for mat in self.mats.iter_mut() {
            mat.cubbies.iter_mut().for_each(CubbySlot::tare);
        }
    }

    /// Take the current reading of every box cup as its zero point.
    pub fn tare_boxes(&mut self) {
        debug!("taring all boxes");
        for b in self.boxes.iter_mut() {
            b.cups.iter_mut().for_each(CubbySlot::tare);
        }
    }
}
