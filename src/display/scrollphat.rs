use rppal::i2c;
use std::thread;
use std::time::Duration;

use super::{Canvas, Display, HEIGHT, WIDTH};

const ENABLE_BYTES: usize = 18;
const PWM_BYTES: usize = 144;

/// Pimoroni Scroll pHAT HD: a 17x7 matrix behind an IS31FL3731 charlieplex driver on I2C.
pub struct ScrollPhatHd {
    hardware_interface: Box<dyn HardwareInterface>,
    frame: u8,
    rotate: bool,
}

impl ScrollPhatHd {
    const ADDRESS: u16 = 0x74;

    const BANK_ADDRESS: u8 = 0xFD; // Selects which register page the following writes go to
    const CONFIG_BANK: u8 = 0x0B;

    const MODE_REGISTER: u8 = 0x00;
    const FRAME_REGISTER: u8 = 0x01;
    const AUDIOSYNC_REGISTER: u8 = 0x06;
    const SHUTDOWN_REGISTER: u8 = 0x0A;

    const PICTURE_MODE: u8 = 0x00;

    const ENABLE_OFFSET: u8 = 0x00;
    const COLOR_OFFSET: u8 = 0x24;

    pub fn new(rotate: bool) -> Result<Self, i2c::Error> {
        let mut i2c = i2c::I2c::new()?;
        i2c.set_slave_address(Self::ADDRESS)?;

        Ok(Self::with_interface(
            Box::new(DisplayHardwareInterface { i2c }),
            rotate,
        ))
    }

    fn with_interface(hardware_interface: Box<dyn HardwareInterface>, rotate: bool) -> Self {
        Self {
            hardware_interface,
            frame: 0,
            rotate,
        }
    }

    fn bank(&mut self, bank: u8) -> Result<(), i2c::Error> {
        self.hardware_interface
            .write_register(Self::BANK_ADDRESS, &[bank])
    }

    fn send_config(&mut self, register: u8, value: u8) -> Result<(), i2c::Error> {
        self.bank(Self::CONFIG_BANK)?;
        self.hardware_interface.write_register(register, &[value])
    }

    pub fn reset(&mut self) -> Result<(), i2c::Error> {
        self.send_config(Self::SHUTDOWN_REGISTER, 0x00)?;
        thread::sleep(Duration::from_micros(10));
        self.send_config(Self::SHUTDOWN_REGISTER, 0x01)
    }

    /// Map a matrix coordinate to its offset in the driver's PWM table. The Scroll pHAT HD
    /// wires the left nine columns and the right eight columns into opposite halves of the
    /// charlieplex grid.
    fn pixel_address(x: usize, y: usize) -> usize {
        let (x, y) = (x as isize, y as isize);
        let (column, row) = if x > 8 {
            (x - 8, 6 - (y + 8))
        } else {
            (8 - x, y)
        };

        (column * 16 + row) as usize
    }

    fn pwm_buffer(&self, canvas: &Canvas) -> [u8; PWM_BYTES] {
        let mut buffer = [0x00; PWM_BYTES];

        for (y, row) in canvas.rows().enumerate() {
            for (x, brightness) in row.iter().enumerate() {
                let (x, y) = if self.rotate {
                    (WIDTH - 1 - x, HEIGHT - 1 - y)
                } else {
                    (x, y)
                };
                buffer[Self::pixel_address(x, y)] = (brightness * 255.) as u8;
            }
        }

        buffer
    }
}

impl Display for ScrollPhatHd {
    type Err = i2c::Error;

    fn on(&mut self) -> Result<(), Self::Err> {
        self.reset()?;

        self.send_config(Self::MODE_REGISTER, Self::PICTURE_MODE)?;
        self.send_config(Self::AUDIOSYNC_REGISTER, 0x00)?;

        // Enable every LED in both frames we flip between.
        for frame in 0..2 {
            self.bank(frame)?;
            self.hardware_interface
                .write_register(Self::ENABLE_OFFSET, &[0xFF; ENABLE_BYTES])?;
        }

        self.show(&Canvas::new())
    }

    fn off(&mut self) -> Result<(), Self::Err> {
        self.show(&Canvas::new())?;
        self.send_config(Self::SHUTDOWN_REGISTER, 0x00)
    }

    fn show(&mut self, canvas: &Canvas) -> Result<(), Self::Err> {
        let buffer = self.pwm_buffer(canvas);

        // Draw into the hidden frame, then flip to it so partial writes never show.
        let next_frame = if self.frame == 0 { 1 } else { 0 };
        self.bank(next_frame)?;
        for (index, chunk) in buffer.chunks(32).enumerate() {
            self.hardware_interface
                .write_register(Self::COLOR_OFFSET + (index * 32) as u8, chunk)?;
        }

        self.send_config(Self::FRAME_REGISTER, next_frame)?;
        self.frame = next_frame;

        Ok(())
    }

    fn get_dimensions(&self) -> (usize, usize) {
        (WIDTH, HEIGHT)
    }
}

struct DisplayHardwareInterface {
    i2c: i2c::I2c,
}

impl HardwareInterface for DisplayHardwareInterface {
    fn write_register(&mut self, register: u8, data: &[u8]) -> Result<(), i2c::Error> {
        let mut buffer = Vec::with_capacity(data.len() + 1);
        buffer.push(register);
        buffer.extend_from_slice(data);

        self.i2c.write(&buffer).map(|_| ())
    }
}

trait HardwareInterface {
    fn write_register(&mut self, register: u8, data: &[u8]) -> Result<(), i2c::Error>;
}
