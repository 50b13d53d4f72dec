//! Persistent device identities and calibration.
//!
//! Values live in an INI-style store, one section per mat and per slot:
//!
//! ```text
//! [MATL1L]
//! UUID=513
//! LCDID=13
//!
//! [CubbyR1C1]
//! ADC_PEELING=524288
//! WeightSingle=12.5
//! WeightPerADC=0.93361
//! ```
//!
//! Mats at even table indices are the left (`L`) half of a row, odd ones the
//! right (`R`) half. Slot columns count across both halves, so the cubbies of
//! `MATL1R` are `CubbyR1C5` to `CubbyR1C8`. Boxes use `BOX<n>` and
//! `CupB<n>C<m>`, both counted from 1.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, warn};
use snafu::{ensure, ResultExt, Snafu};

use crate::nom_parser::{ini_line, IniLine};
use crate::registry::{
    CubbyMetadata, Device, DeviceRegistry, BOX_COUNT, CUBBY_COUNT, CUP_COUNT,
    DEFAULT_ADC_PEELING, DEFAULT_SINGLE_ITEM_WEIGHT, DEFAULT_WEIGHT_PER_ADC, MAT_COUNT,
};
use crate::types::DeviceAddress;

/// Error type for this module
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Could not read {}: {}", path.display(), source))]
    Read { path: PathBuf, source: io::Error },
    #[snafu(display("Could not write {}: {}", path.display(), source))]
    Write { path: PathBuf, source: io::Error },
    #[snafu(display("Value of [{}] {} spans more than one line", section, key))]
    InvalidValue { section: String, key: String },
}

pub const UUID: &str = "UUID";
pub const LCD_ID: &str = "LCDID";
pub const ADC_PEELING: &str = "ADC_PEELING";
pub const WEIGHT_SINGLE: &str = "WeightSingle";
pub const WEIGHT_PER_ADC: &str = "WeightPerADC";
pub const LOCATION_ID: &str = "Location_id";
pub const PRODUCT_NUM: &str = "ProductNum";
pub const DESC1: &str = "Desc1";
pub const DESC2: &str = "Desc2";
pub const MIN_QTY: &str = "Min_Qty";
pub const MAX_QTY: &str = "Max_Qty";
pub const REORDER_QTY: &str = "Reorder_Qty";
pub const PICTURE: &str = "Picture";

/// Section holding settings of the controller itself.
pub const GLOBAL_SECTION: &str = "EMBEDED";
/// Key in [`GLOBAL_SECTION`] overriding the default grams per ADC count.
pub const GLOBAL_WEIGHT_PER_ADC: &str = "WEIGHTPERADC";

/// A key/value store organized in sections.
pub trait ConfigStore {
    fn get(&self, section: &str, key: &str) -> Option<String>;

    fn set(&mut self, section: &str, key: &str, value: &str) -> Result<(), Error>;
}

/// Values are stored one per line.
fn check_value(section: &str, key: &str, value: &str) -> Result<(), Error> {
    ensure!(
        !value.contains(&['\n', '\r'][..]),
        InvalidValueSnafu { section, key }
    );
    Ok(())
}

/// Store kept in memory only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    values: HashMap<(String, String), String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.values
            .get(&(section.to_string(), key.to_string()))
            .cloned()
    }

    fn set(&mut self, section: &str, key: &str, value: &str) -> Result<(), Error> {
        check_value(section, key, value)?;
        self.values
            .insert((section.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}

/// INI file on disk. The first `get` parses the whole file and later ones
/// are served from that, every `set` that changes a value rewrites the file
/// through a temporary file and a rename.
#[derive(Debug, Clone)]
pub struct IniFile {
    path: PathBuf,
    parsed: RefCell<Option<MemoryStore>>,
}

impl IniFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            parsed: RefCell::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The file contents, empty if the file doesn't exist yet.
    fn contents(&self) -> Result<String, Error> {
        match fs::read_to_string(&self.path) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            other => other.context(ReadSnafu {
                path: self.path.clone(),
            }),
        }
    }
}

impl ConfigStore for IniFile {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        if self.parsed.borrow().is_none() {
            match self.contents() {
                Ok(text) => *self.parsed.borrow_mut() = Some(parse_entries(&text)),
                Err(e) => {
                    warn!("{}", e);
                    return None;
                }
            }
        }
        self.parsed
            .borrow()
            .as_ref()
            .and_then(|entries| entries.get(section, key))
    }

    fn set(&mut self, section: &str, key: &str, value: &str) -> Result<(), Error> {
        check_value(section, key, value)?;
        let text = self.contents()?;
        if lookup(&text, section, key) == Some(value) {
            return Ok(());
        }
        debug!("{}: [{}] {}={}", self.path.display(), section, key, value);
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        *self.parsed.get_mut() = None;
        fs::write(&tmp, replace_value(&text, section, key, value))
            .context(WriteSnafu { path: tmp.clone() })?;
        fs::rename(&tmp, &self.path).context(WriteSnafu {
            path: self.path.clone(),
        })
    }
}

/// Every entry of an INI text. The first one wins where a key repeats.
fn parse_entries(text: &str) -> MemoryStore {
    let mut entries = MemoryStore::new();
    let mut section = None;
    for line in text.lines() {
        match ini_line(line) {
            IniLine::Section(name) => section = Some(name),
            IniLine::Entry { key, value } => {
                if let Some(section) = section {
                    entries
                        .values
                        .entry((section.to_string(), key.to_string()))
                        .or_insert_with(|| value.to_string());
                }
            }
            IniLine::Other => {}
        }
    }
    entries
}

fn lookup<'a>(text: &'a str, section: &str, key: &str) -> Option<&'a str> {
    let mut in_section = false;
    for line in text.lines() {
        match ini_line(line) {
            IniLine::Section(name) => in_section = name == section,
            IniLine::Entry { key: k, value } if in_section && k == key => return Some(value),
            _ => {}
        }
    }
    None
}

#[derive(Copy, Clone, PartialEq)]
enum Rewrite {
    SeekSection,
    InSection,
    Copy,
}

/// Copy `text`, replacing or inserting `key` in `section`. New keys go after
/// the last entry of the section, a missing section is appended at the end.
fn replace_value(text: &str, section: &str, key: &str, value: &str) -> String {
    let entry = format!("{}={}\n", key, value);
    let mut out = String::with_capacity(text.len() + entry.len() + section.len() + 3);
    let mut state = Rewrite::SeekSection;
    // blank and comment lines seen since the last entry of the section
    let mut held: Vec<&str> = Vec::new();
    for line in text.lines() {
        let parsed = ini_line(line);
        match (state, parsed) {
            (Rewrite::SeekSection, IniLine::Section(name)) if name == section => {
                state = Rewrite::InSection;
            }
            (Rewrite::InSection, IniLine::Entry { key: k, .. }) if k == key => {
                push_lines(&mut out, held.drain(..));
                out.push_str(&entry);
                state = Rewrite::Copy;
                continue;
            }
            (Rewrite::InSection, IniLine::Section(_)) => {
                out.push_str(&entry);
                push_lines(&mut out, held.drain(..));
                state = Rewrite::Copy;
            }
            (Rewrite::InSection, IniLine::Other) => {
                held.push(line);
                continue;
            }
            (Rewrite::InSection, IniLine::Entry { .. }) => {
                push_lines(&mut out, held.drain(..));
            }
            _ => {}
        }
        push_lines(&mut out, Some(line));
    }
    match state {
        Rewrite::SeekSection => {
            out.push_str(&format!("[{}]\n", section));
            out.push_str(&entry);
        }
        Rewrite::InSection => {
            out.push_str(&entry);
            push_lines(&mut out, held);
        }
        Rewrite::Copy => {}
    }
    out
}

fn push_lines<'a>(out: &mut String, lines: impl IntoIterator<Item = &'a str>) {
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
}

/// Section of the mat at table index `index`.
pub fn mat_section(index: usize) -> String {
    let side = if index % 2 == 0 { 'L' } else { 'R' };
    format!("MATL{}{}", index / 2 + 1, side)
}

/// Section of cubby `slot` of the mat at table index `index`.
pub fn cubby_section(index: usize, slot: usize) -> String {
    format!("CubbyR{}C{}", index / 2 + 1, (index % 2) * CUBBY_COUNT + slot + 1)
}

pub fn box_section(index: usize) -> String {
    format!("BOX{}", index + 1)
}

pub fn cup_section(index: usize, cup: usize) -> String {
    format!("CupB{}C{}", index + 1, cup + 1)
}

fn slot_section(device: Device, slot: usize) -> String {
    match device {
        Device::Mat(index) => cubby_section(index, slot),
        Device::Box(index) => cup_section(index, slot),
    }
}

/// Parse a value, falling back to `default` if it's missing or unparseable.
fn get_or<S, T>(store: &S, section: &str, key: &str, default: T) -> T
where
    S: ConfigStore + ?Sized,
    T: FromStr + Display,
{
    match store.get(section, key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(
                "[{}] {}: can't parse {:?}, using {}",
                section, key, raw, default
            );
            default
        }),
    }
}

fn get_address<S>(store: &S, section: &str, key: &str) -> DeviceAddress
where
    S: ConfigStore + ?Sized,
{
    DeviceAddress::from(get_or(store, section, key, 0u16))
}

/// Build a registry from the stored identities and calibration. Missing or
/// broken values get the defaults.
pub fn load_registry<S: ConfigStore + ?Sized>(store: &S) -> DeviceRegistry {
    let weight_per_adc = get_or(
        store,
        GLOBAL_SECTION,
        GLOBAL_WEIGHT_PER_ADC,
        DEFAULT_WEIGHT_PER_ADC,
    );
    let mut registry = DeviceRegistry::new();
    for index in 0..MAT_COUNT {
        let section = mat_section(index);
        let _ = registry.set_mat_identity(index, get_address(store, &section, UUID));
        let _ = registry.set_mat_display(index, get_address(store, &section, LCD_ID));
        for slot in 0..CUBBY_COUNT {
            load_slot(store, &mut registry, Device::Mat(index), slot, weight_per_adc);
        }
    }
    for index in 0..BOX_COUNT {
        let _ = registry.set_box_identity(index, get_address(store, &box_section(index), UUID));
        for cup in 0..CUP_COUNT {
            load_slot(store, &mut registry, Device::Box(index), cup, weight_per_adc);
        }
    }
    registry
}

fn load_slot<S: ConfigStore + ?Sized>(
    store: &S,
    registry: &mut DeviceRegistry,
    device: Device,
    slot: usize,
    weight_per_adc: f32,
) {
    let section = slot_section(device, slot);
    let section = section.as_str();
    let _ = registry.set_peeling(
        device,
        slot,
        get_or(store, section, ADC_PEELING, DEFAULT_ADC_PEELING),
    );
    let _ = registry.set_calibration(
        device,
        slot,
        get_or(store, section, WEIGHT_SINGLE, DEFAULT_SINGLE_ITEM_WEIGHT),
        get_or(store, section, WEIGHT_PER_ADC, weight_per_adc),
    );
    let _ = registry.set_quantity_bounds(
        device,
        slot,
        get_or(store, section, MIN_QTY, 0),
        get_or(store, section, MAX_QTY, 0),
        get_or(store, section, REORDER_QTY, 0),
    );
    let text = |key| store.get(section, key).unwrap_or_default();
    let metadata = CubbyMetadata {
        location_id: text(LOCATION_ID),
        product_num: text(PRODUCT_NUM),
        desc1: text(DESC1),
        desc2: text(DESC2),
        picture: text(PICTURE),
    };
    let _ = registry.set_metadata(device, slot, metadata);
}

/// Everything the application can change about a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct CubbyInfo {
    pub metadata: CubbyMetadata,
    pub min_qty: u32,
    pub max_qty: u32,
    pub reorder_qty: u32,
    pub single_item_weight: f32,
    pub weight_per_adc: f32,
}

impl Default for CubbyInfo {
    fn default() -> Self {
        Self {
            metadata: CubbyMetadata::default(),
            min_qty: 0,
            max_qty: 0,
            reorder_qty: 0,
            single_item_weight: DEFAULT_SINGLE_ITEM_WEIGHT,
            weight_per_adc: DEFAULT_WEIGHT_PER_ADC,
        }
    }
}

pub fn store_mat_identity<S>(store: &mut S, index: usize, mat_id: DeviceAddress) -> Result<(), Error>
where
    S: ConfigStore + ?Sized,
{
    store.set(&mat_section(index), UUID, &mat_id.to_string())
}

pub fn store_mat_display<S>(store: &mut S, index: usize, lcd_id: DeviceAddress) -> Result<(), Error>
where
    S: ConfigStore + ?Sized,
{
    store.set(&mat_section(index), LCD_ID, &lcd_id.to_string())
}

pub fn store_box_identity<S>(store: &mut S, index: usize, box_id: DeviceAddress) -> Result<(), Error>
where
    S: ConfigStore + ?Sized,
{
    store.set(&box_section(index), UUID, &box_id.to_string())
}

/// Store the tare baseline of every slot of a device.
pub fn store_peeling<S>(store: &mut S, registry: &DeviceRegistry, device: Device) -> Result<(), Error>
where
    S: ConfigStore + ?Sized,
{
    let slots = match device {
        Device::Mat(index) => registry.mat(index).map(|m| &m.cubbies[..]),
        Device::Box(index) => registry.cup_box(index).map(|b| &b.cups[..]),
    };
    for (slot, cubby) in slots.unwrap_or_default().iter().enumerate() {
        store.set(
            &slot_section(device, slot),
            ADC_PEELING,
            &cubby.adc_peeling.to_string(),
        )?;
    }
    Ok(())
}

pub fn store_cubby_info<S>(store: &mut S, device: Device, slot: usize, info: &CubbyInfo) -> Result<(), Error>
where
    S: ConfigStore + ?Sized,
{
    let section = slot_section(device, slot);
    let values = [
        (LOCATION_ID, info.metadata.location_id.clone()),
        (PRODUCT_NUM, info.metadata.product_num.clone()),
        (DESC1, info.metadata.desc1.clone()),
        (DESC2, info.metadata.desc2.clone()),
        (MIN_QTY, info.min_qty.to_string()),
        (MAX_QTY, info.max_qty.to_string()),
        (REORDER_QTY, info.reorder_qty.to_string()),
        (PICTURE, info.metadata.picture.clone()),
        (WEIGHT_SINGLE, info.single_item_weight.to_string()),
        (WEIGHT_PER_ADC, info.weight_per_adc.to_string()),
    ];
    for (key, value) in values.iter() {
        store.set(&section, key, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::addr;

    fn temp_ini(name: &str) -> IniFile {
        let path = std::env::temp_dir().join(format!(
            "cubby-bus-{}-{}.ini",
            name,
            std::process::id()
        ));
        let _ = fs::remove_file(&path);
        IniFile::new(path)
    }

    #[test]
    fn test_section_names() {
        assert_eq!(mat_section(0), "MATL1L");
        assert_eq!(mat_section(1), "MATL1R");
        assert_eq!(mat_section(9), "MATL5R");
        assert_eq!(cubby_section(0, 0), "CubbyR1C1");
        assert_eq!(cubby_section(1, 0), "CubbyR1C5");
        assert_eq!(cubby_section(9, 3), "CubbyR5C8");
        assert_eq!(box_section(0), "BOX1");
        assert_eq!(cup_section(3, 23), "CupB4C24");
    }

    #[test]
    fn test_load_defaults() {
        let reg = load_registry(&MemoryStore::new());
        assert_eq!(reg, {
            let mut expected = DeviceRegistry::new();
            // loading recomputes the derived values of every slot
            for index in 0..MAT_COUNT {
                let _ = expected.record_readings(Device::Mat(index), &[]);
            }
            for index in 0..BOX_COUNT {
                let _ = expected.record_readings(Device::Box(index), &[]);
            }
            expected
        });
        let cubby = &reg.mat(4).unwrap().cubbies[2];
        assert_eq!(cubby.adc_peeling, DEFAULT_ADC_PEELING);
        assert_eq!(cubby.single_item_weight, DEFAULT_SINGLE_ITEM_WEIGHT);
        assert_eq!(cubby.weight_per_adc, DEFAULT_WEIGHT_PER_ADC);
    }

    #[test]
    fn test_load_values() {
        let mut store = MemoryStore::new();
        store.set("MATL2R", UUID, "513").unwrap();
        store.set("MATL2R", LCD_ID, "13").unwrap();
        store.set("CubbyR2C6", WEIGHT_SINGLE, "20.5").unwrap();
        store.set("CubbyR2C6", PRODUCT_NUM, "P-7").unwrap();
        store.set("CubbyR2C6", MAX_QTY, "40").unwrap();
        store.set("BOX2", UUID, "768").unwrap();
        store.set(GLOBAL_SECTION, GLOBAL_WEIGHT_PER_ADC, "0.5").unwrap();

        let reg = load_registry(&store);
        let mat = reg.mat(3).unwrap();
        assert_eq!(mat.mat_id, addr(0x0201));
        assert_eq!(mat.lcd_id, addr(13));
        assert_eq!(mat.cubbies[1].single_item_weight, 20.5);
        assert_eq!(mat.cubbies[1].metadata.product_num, "P-7");
        assert_eq!(mat.cubbies[1].max_qty, 40);
        assert_eq!(mat.cubbies[1].weight_per_adc, 0.5);
        assert_eq!(reg.find_box(addr(0x0300)), Some(1));
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let mut store = MemoryStore::new();
        store.set("CubbyR1C1", ADC_PEELING, "oops").unwrap();
        store.set("CubbyR1C1", WEIGHT_SINGLE, "").unwrap();
        store.set("MATL1L", UUID, "70000").unwrap();
        let reg = load_registry(&store);
        let cubby = &reg.mat(0).unwrap().cubbies[0];
        assert_eq!(cubby.adc_peeling, DEFAULT_ADC_PEELING);
        assert_eq!(cubby.single_item_weight, DEFAULT_SINGLE_ITEM_WEIGHT);
        assert_eq!(cubby.weight_per_adc, DEFAULT_WEIGHT_PER_ADC);
        assert_eq!(reg.mat(0).unwrap().mat_id, DeviceAddress::UNASSIGNED);
    }

    #[test]
    fn test_replace_value() {
        let text = "; bus setup\n[MATL1L]\nUUID=1\nLCDID=13\n\n[MATL1R]\nUUID=2\n";
        assert_eq!(
            replace_value(text, "MATL1L", "UUID", "7"),
            "; bus setup\n[MATL1L]\nUUID=7\nLCDID=13\n\n[MATL1R]\nUUID=2\n"
        );
        assert_eq!(
            replace_value(text, "MATL1R", "LCDID", "14"),
            "; bus setup\n[MATL1L]\nUUID=1\nLCDID=13\n\n[MATL1R]\nUUID=2\nLCDID=14\n"
        );
        assert_eq!(
            replace_value(text, "MATL1L", "Extra", "x"),
            "; bus setup\n[MATL1L]\nUUID=1\nLCDID=13\nExtra=x\n\n[MATL1R]\nUUID=2\n"
        );
        assert_eq!(
            replace_value("[A]\nk=v\n; end\n", "A", "n", "1"),
            "[A]\nk=v\nn=1\n; end\n"
        );
        assert_eq!(
            replace_value("[A]\nk=v", "B", "k", "w"),
            "[A]\nk=v\n[B]\nk=w\n"
        );
        assert_eq!(replace_value("", "B", "k", "w"), "[B]\nk=w\n");
    }

    #[test]
    fn test_ini_file_round_trip() {
        let mut ini = temp_ini("round-trip");
        assert_eq!(ini.get("MATL1L", UUID), None);
        ini.set("MATL1L", UUID, "513").unwrap();
        ini.set("MATL1L", LCD_ID, "13").unwrap();
        ini.set("CubbyR1C1", ADC_PEELING, "1000").unwrap();
        ini.set("MATL1L", UUID, "514").unwrap();
        assert_eq!(ini.get("MATL1L", UUID).as_deref(), Some("514"));
        assert_eq!(ini.get("MATL1L", LCD_ID).as_deref(), Some("13"));
        assert_eq!(ini.get("CubbyR1C1", ADC_PEELING).as_deref(), Some("1000"));
        assert_eq!(ini.get("CubbyR1C1", UUID), None);
        let text = fs::read_to_string(ini.path()).unwrap();
        assert_eq!(
            text,
            "[MATL1L]\nUUID=514\nLCDID=13\n[CubbyR1C1]\nADC_PEELING=1000\n"
        );
        fs::remove_file(ini.path()).unwrap();
    }

    #[test]
    fn test_multiline_values_rejected() {
        let mut ini = temp_ini("multiline");
        ini.set("CubbyR1C1", DESC1, "bolts").unwrap();
        let err = ini
            .set("CubbyR1C1", DESC1, "bolts\n[MATL1L]\nUUID=999")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
        assert!(ini.set("CubbyR1C1", DESC2, "nuts\r").is_err());
        assert_eq!(ini.get("CubbyR1C1", DESC1).as_deref(), Some("bolts"));
        assert_eq!(ini.get("MATL1L", UUID), None);
        let text = fs::read_to_string(ini.path()).unwrap();
        assert_eq!(text, "[CubbyR1C1]\nDesc1=bolts\n");
        fs::remove_file(ini.path()).unwrap();

        let mut mem = MemoryStore::new();
        assert!(mem.set("MATL1L", DESC1, "a\nb").is_err());
        assert_eq!(mem.get("MATL1L", DESC1), None);
    }

    #[test]
    fn test_ini_file_parsed_once() {
        let mut ini = temp_ini("parsed-once");
        fs::write(
            ini.path(),
            "[MATL1L]\nUUID=513\nUUID=600\n[CubbyR1C1]\nADC_PEELING=1000\n",
        )
        .unwrap();
        assert_eq!(ini.get("MATL1L", UUID).as_deref(), Some("513"));
        // served from the parsed copy, not the file
        fs::write(ini.path(), "[MATL1L]\nUUID=1\n").unwrap();
        assert_eq!(load_registry(&ini).find_mat(addr(513)), Some(0));
        assert_eq!(ini.get("CubbyR1C1", ADC_PEELING).as_deref(), Some("1000"));
        // a write drops it
        ini.set("MATL1L", LCD_ID, "13").unwrap();
        assert_eq!(ini.get("MATL1L", UUID).as_deref(), Some("1"));
        assert_eq!(ini.get("MATL1L", LCD_ID).as_deref(), Some("13"));
        assert_eq!(ini.get("CubbyR1C1", ADC_PEELING), None);
        fs::remove_file(ini.path()).unwrap();
    }

    #[test]
    fn test_persist_and_reload() {
        let mut store = MemoryStore::new();
        store_mat_identity(&mut store, 2, addr(0x0201)).unwrap();
        store_mat_display(&mut store, 2, addr(13)).unwrap();
        store_box_identity(&mut store, 0, addr(0x0300)).unwrap();
        let info = CubbyInfo {
            metadata: CubbyMetadata {
                product_num: "P-1".to_string(),
                ..CubbyMetadata::default()
            },
            min_qty: 1,
            max_qty: 9,
            reorder_qty: 3,
            single_item_weight: 10.0,
            weight_per_adc: 1.0,
        };
        store_cubby_info(&mut store, Device::Mat(2), 1, &info).unwrap();

        let mut reg = load_registry(&store);
        let _ = reg.record_readings(Device::Mat(2), &[5, 6, 7, 8]);
        reg.tare_all();
        store_peeling(&mut store, &reg, Device::Mat(2)).unwrap();

        let reloaded = load_registry(&store);
        let mat = reloaded.mat(2).unwrap();
        assert_eq!(mat.mat_id, addr(0x0201));
        assert_eq!(mat.lcd_id, addr(13));
        assert_eq!(mat.cubbies[1].adc_peeling, 6);
        assert_eq!(mat.cubbies[1].single_item_weight, 10.0);
        assert_eq!(mat.cubbies[1].reorder_qty, 3);
        assert_eq!(mat.cubbies[1].metadata.product_num, "P-1");
        assert_eq!(reloaded.find_box(addr(0x0300)), Some(0));
    }
}
