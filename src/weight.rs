//! Conversion of raw ADC readings into weight and item count.

use crate::registry::CubbySlot;

/// Distance of the raw reading from the tare baseline, in ADC counts.
pub fn adc_delta(slot: &CubbySlot) -> u32 {
    slot.adc_raw.abs_diff(slot.adc_peeling)
}

/// Calibrated weight of whatever sits on the slot.
pub fn weight_of(slot: &CubbySlot) -> f32 {
    adc_delta(slot) as f32 * slot.weight_per_adc
}

/// Recompute `weight` and `quantity` of one slot.
///
/// Slots without a positive single item weight are left untouched.
/// Returns true if the slot was updated.
pub fn update_slot(slot: &mut CubbySlot) -> bool {
    if !(slot.single_item_weight > 0.0) {
        return false;
    }
    slot.weight = weight_of(slot);
    // float to int casts saturate, a negative calibration yields 0
    slot.quantity = (slot.weight / slot.single_item_weight).floor() as u32;
    true
}

/// Recompute every slot of a device. Slots don't influence each other.
pub fn update(slots: &mut [CubbySlot]) {
    for slot in slots.iter_mut() {
        update_slot(slot);
    }
}
