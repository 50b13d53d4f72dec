use std::error::Error;
use std::io::{self, Read, Write};

use cubby_bus::device::MatEmulator;
use cubby_bus::{addr, McuFamily};

fn mat_main_loop() -> Result<(), Box<dyn Error>> {
    let mut mat = MatEmulator::new(addr(0x0201), McuFamily::Holtek, 0x0001_0203);
    mat.adc = [0x80000, 0x80400, 0x80800, 0x80C00];

    let mut data_in = [0; 64];
    loop {
        let len = io::stdin().read(&mut data_in)?;
        if len == 0 {
            break;
        }
        if let Some(reply) = mat.receive_data(&data_in[..len]) {
            let mut stdout = io::stdout();
            stdout.write_all(&reply)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    mat_main_loop()
}
