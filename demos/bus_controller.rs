use anyhow::{bail, Context, Result};
use serialport::{DataBits, Parity, StopBits};
use std::io::Write;
use std::str::{FromStr, SplitWhitespace};
use std::sync::mpsc;
use std::time::Duration;

use cubby_bus::config::IniFile;
use cubby_bus::registry::CUBBY_COUNT;
use cubby_bus::scheduler::{IoTransport, SchedulerConfig, Transport};
use cubby_bus::{ConfigStore, Controller, DeviceAddress, McuFamily};

const READ_TIMEOUT: Duration = Duration::from_millis(100);

fn family(name: &str) -> Result<McuFamily> {
    match name {
        "holtek" | "ht" => Ok(McuFamily::Holtek),
        "stm32" | "stm" => Ok(McuFamily::Stm32),
        _ => bail!("Unknown MCU family {}", name),
    }
}

fn cmd_show<T: Transport, S: ConfigStore>(controller: &Controller<T, S>) {
    for (index, mat) in controller.registry().mats().iter().enumerate() {
        if !mat.mat_id.is_assigned() {
            continue;
        }
        let slots: Vec<String> = mat
            .cubbies
            .iter()
            .map(|c| format!("{:.0}g/{}", c.weight, c.quantity))
            .collect();
        println!("mat {} ({:#06X}): {}", index, *mat.mat_id, slots.join(" "));
    }
    if let Some(id) = controller.registry().captured_id() {
        println!("last id reply: {:#08X}", id);
    }
}

fn run_command<T: Transport, S: ConfigStore>(
    line: &str,
    controller: &mut Controller<T, S>,
) -> Result<()> {
    let mut scan = CmdScanner::new(line);
    match scan.next()? {
        "show" | "s" => cmd_show(controller),
        "led" => {
            let mat_id: u16 = scan.parse_next()?;
            let mask = u8::from_str_radix(scan.next()?, 16).context("Mask is hex")?;
            controller.set_led(DeviceAddress::from(mat_id), mask)?;
        }
        "getid" => controller.request_device_id(family(scan.next()?)?)?,
        "setid" => {
            let family = family(scan.next()?)?;
            let id: u16 = scan.parse_next()?;
            controller.assign_device_id(family, DeviceAddress::from(id))?;
        }
        "mat" => {
            let index: usize = scan.parse_next()?;
            let id: u16 = scan.parse_next()?;
            if !controller.set_mat_identity(index, DeviceAddress::from(id))?.is_applied() {
                println!("No mat {}", index);
            }
        }
        "lcd" => {
            let index: usize = scan.parse_next()?;
            let id: u16 = scan.parse_next()?;
            if !controller.set_mat_display(index, DeviceAddress::from(id))?.is_applied() {
                println!("No mat {}", index);
            }
        }
        "tare" => controller.tare_all()?,
        "help" => println!(
            "show | led <id> <hex mask> | getid <holtek|stm32> | setid <family> <id> \
             | mat <index> <id> | lcd <index> <id> | tare ({} cubbies per mat)",
            CUBBY_COUNT
        ),
        cmd => println!("Unknown command {}", cmd),
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args();
    args.next(); // Skip program name
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let config = args.next().unwrap_or_else(|| "bus.ini".to_string());

    let serial = serialport::new(&port, 9600)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(READ_TIMEOUT)
        .open()
        .with_context(|| format!("Failed to open serial port {}", port))?;

    let mut controller = Controller::new(
        IoTransport::new(serial),
        IniFile::new(config),
        SchedulerConfig {
            read_timeout: READ_TIMEOUT,
            ..SchedulerConfig::default()
        },
    );

    // commands are read on their own thread, the bus loop never blocks on stdin
    let (line_tx, line_rx) = mpsc::channel::<String>();
    std::thread::spawn(move || loop {
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        }
    });

    let mut stdout = std::io::stdout();
    print!(">> ");
    stdout.flush()?;
    loop {
        controller.tick()?;
        match line_rx.try_recv() {
            Ok(line) => {
                if let Err(err) = run_command(&line, &mut controller) {
                    println!("{:?}", err);
                }
                print!(">> ");
                stdout.flush()?;
            }
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => return Ok(()),
        }
    }
}

struct CmdScanner<'a> {
    splt: SplitWhitespace<'a>,
}

impl<'a> CmdScanner<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            splt: line.split_whitespace(),
        }
    }

    fn next(&mut self) -> Result<&'a str> {
        self.splt.next().context("End of stream")
    }

    fn parse_next<T: FromStr>(&mut self) -> Result<T> {
        self.next()?.parse::<T>().ok().context("Parse error")
    }
}
