use serde::Serialize;

pub const MIN_KELVIN: u16 = 2000;
pub const MAX_KELVIN: u16 = 10_000;
pub const KELVIN_STEP: u16 = 100;
pub const TABLE_LEN: usize = ((MAX_KELVIN - MIN_KELVIN) / KELVIN_STEP) as usize + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Kelvin(u16);

impl Kelvin {
    pub const DEFAULT: Self = Self(4000);

    pub fn new(value: i64) -> Option<Self> {
        let in_range = (i64::from(MIN_KELVIN)..=i64::from(MAX_KELVIN)).contains(&value);
        if in_range && value % i64::from(KELVIN_STEP) == 0 {
            Some(Self(value as u16))
        } else {
            None
        }
    }

    pub fn value(self) -> u16 {
        self.0
    }

    fn index(self) -> usize {
        usize::from((self.0 - MIN_KELVIN) / KELVIN_STEP)
    }
}

impl Default for Kelvin {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// https://andi-siess.de/rgb-to-color-temperature/
pub const KELVIN_TABLE: [(u16, Rgb); TABLE_LEN] = [
    (2000, Rgb::new(255, 138, 18)),
    (2100, Rgb::new(255, 142, 33)),
    (2200, Rgb::new(255, 147, 44)),
    (2300, Rgb::new(255, 152, 54)),
    (2400, Rgb::new(255, 157, 63)),
    (2500, Rgb::new(255, 161, 72)),
    (2600, Rgb::new(255, 165, 79)),
    (2700, Rgb::new(255, 169, 87)),
    (2800, Rgb::new(255, 173, 94)),
    (2900, Rgb::new(255, 177, 101)),
    (3000, Rgb::new(255, 180, 107)),
    (3100, Rgb::new(255, 184, 114)),
    (3200, Rgb::new(255, 187, 120)),
    (3300, Rgb::new(255, 190, 126)),
    (3400, Rgb::new(255, 193, 132)),
    (3500, Rgb::new(255, 196, 137)),
    (3600, Rgb::new(255, 199, 143)),
    (3700, Rgb::new(255, 201, 148)),
    (3800, Rgb::new(255, 204, 153)),
    (3900, Rgb::new(255, 206, 159)),
    (4000, Rgb::new(255, 209, 163)),
    (4100, Rgb::new(255, 211, 168)),
    (4200, Rgb::new(255, 213, 173)),
    (4300, Rgb::new(255, 215, 177)),
    (4400, Rgb::new(255, 217, 182)),
    (4500, Rgb::new(255, 219, 186)),
    (4600, Rgb::new(255, 221, 190)),
    (4700, Rgb::new(255, 223, 194)),
    (4800, Rgb::new(255, 225, 198)),
    (4900, Rgb::new(255, 227, 202)),
    (5000, Rgb::new(255, 228, 206)),
    (5100, Rgb::new(255, 230, 210)),
    (5200, Rgb::new(255, 232, 213)),
    (5300, Rgb::new(255, 233, 217)),
    (5400, Rgb::new(255, 235, 220)),
    (5500, Rgb::new(255, 236, 224)),
    (5600, Rgb::new(255, 238, 227)),
    (5700, Rgb::new(255, 239, 230)),
    (5800, Rgb::new(255, 240, 233)),
    (5900, Rgb::new(255, 242, 236)),
    (6000, Rgb::new(255, 243, 239)),
    (6100, Rgb::new(255, 244, 242)),
    (6200, Rgb::new(255, 245, 245)),
    (6300, Rgb::new(255, 246, 247)),
    (6400, Rgb::new(255, 248, 251)),
    (6500, Rgb::new(255, 249, 253)),
    (6600, Rgb::new(254, 249, 255)),
    (6700, Rgb::new(252, 247, 255)),
    (6800, Rgb::new(249, 246, 255)),
    (6900, Rgb::new(247, 245, 255)),
    (7000, Rgb::new(245, 243, 255)),
    (7100, Rgb::new(243, 242, 255)),
    (7200, Rgb::new(240, 241, 255)),
    (7300, Rgb::new(239, 240, 255)),
    (7400, Rgb::new(237, 239, 255)),
    (7500, Rgb::new(235, 238, 255)),
    (7600, Rgb::new(233, 237, 255)),
    (7700, Rgb::new(231, 236, 255)),
    (7800, Rgb::new(230, 235, 255)),
    (7900, Rgb::new(228, 234, 255)),
    (8000, Rgb::new(227, 233, 255)),
    (8100, Rgb::new(225, 232, 255)),
    (8200, Rgb::new(224, 231, 255)),
    (8300, Rgb::new(222, 230, 255)),
    (8400, Rgb::new(221, 230, 255)),
    (8500, Rgb::new(220, 229, 255)),
    (8600, Rgb::new(218, 229, 255)),
    (8700, Rgb::new(217, 227, 255)),
    (8800, Rgb::new(216, 227, 255)),
    (8900, Rgb::new(215, 226, 255)),
    (9000, Rgb::new(214, 225, 255)),
    (9100, Rgb::new(212, 225, 255)),
    (9200, Rgb::new(211, 224, 255)),
    (9300, Rgb::new(210, 223, 255)),
    (9400, Rgb::new(209, 223, 255)),
    (9500, Rgb::new(208, 222, 255)),
    (9600, Rgb::new(207, 221, 255)),
    (9700, Rgb::new(207, 221, 255)),
    (9800, Rgb::new(206, 220, 255)),
    (9900, Rgb::new(205, 220, 255)),
    (10000, Rgb::new(207, 218, 255)),
];

// Exact-key lookup; values between grid points are not interpolated.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorTable;

impl ColorTable {
    pub fn rgb(self, kelvin: Kelvin) -> Rgb {
        KELVIN_TABLE[kelvin.index()].1
    }

    pub fn get(self, kelvin: u16) -> Option<Rgb> {
        Kelvin::new(i64::from(kelvin)).map(|k| self.rgb(k))
    }

    pub fn entries(self) -> &'static [(u16, Rgb)] {
        &KELVIN_TABLE
    }
}
