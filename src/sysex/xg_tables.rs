//! Yamaha XG effect parameter tables: 0-127 data codes to physical units.

/// Chorus/flanger LFO rate in Hz.
pub const LFO_FREQUENCY_HZ: [f32; 128] = [
    0.00, 0.04, 0.08, 0.13, 0.17, 0.21, 0.25, 0.29, 0.34, 0.38,
    0.42, 0.46, 0.51, 0.55, 0.59, 0.63, 0.67, 0.72, 0.76, 0.80,
    0.84, 0.88, 0.93, 0.97, 1.01, 1.05, 1.09, 1.14, 1.18, 1.22,
    1.26, 1.30, 1.35, 1.39, 1.43, 1.47, 1.51, 1.56, 1.60, 1.64,
    1.68, 1.72, 1.77, 1.81, 1.85, 1.89, 1.94, 1.98, 2.02, 2.06,
    2.10, 2.15, 2.19, 2.23, 2.27, 2.31, 2.36, 2.40, 2.44, 2.48,
    2.52, 2.57, 2.61, 2.65, 2.69, 2.78, 2.86, 2.94, 3.03, 3.11,
    3.20, 3.28, 3.37, 3.45, 3.53, 3.62, 3.70, 3.87, 4.04, 4.21,
    4.37, 4.54, 4.71, 4.88, 5.05, 5.22, 5.38, 5.55, 5.72, 6.06,
    6.39, 6.73, 7.07, 7.40, 7.74, 8.08, 8.41, 8.75, 9.08, 9.42,
    9.76, 10.10, 10.80, 11.40, 12.10, 12.80, 13.50, 14.10, 14.80, 15.50,
    16.20, 16.80, 17.50, 18.20, 19.50, 20.90, 22.20, 23.60, 24.90, 26.20,
    27.60, 28.90, 30.30, 31.60, 33.00, 34.30, 37.00, 39.70,
];

/// Modulation delay offset in milliseconds.
pub const DELAY_OFFSET_MS: [f32; 128] = [
    0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9,
    1.0, 1.1, 1.2, 1.3, 1.4, 1.5, 1.6, 1.7, 1.8, 1.9,
    2.0, 2.1, 2.2, 2.3, 2.4, 2.5, 2.6, 2.7, 2.8, 2.9,
    3.0, 3.1, 3.2, 3.3, 3.4, 3.5, 3.6, 3.7, 3.8, 3.9,
    4.0, 4.1, 4.2, 4.3, 4.4, 4.5, 4.6, 4.7, 4.8, 4.9,
    5.0, 5.1, 5.2, 5.3, 5.4, 5.5, 5.6, 5.7, 5.8, 5.9,
    6.0, 6.1, 6.2, 6.3, 6.4, 7.2, 8.0, 8.8, 9.6, 10.4,
    11.2, 12.0, 12.8, 13.6, 14.4, 15.2, 16.0, 16.8, 17.6, 18.4,
    19.2, 20.0, 20.8, 21.6, 22.4, 23.2, 24.0, 24.8, 25.6, 26.4,
    27.2, 28.0, 28.8, 29.6, 30.4, 31.2, 32.0, 33.6, 35.2, 36.8,
    38.4, 40.0, 41.6, 43.2, 44.8, 46.4, 48.0, 49.6, 51.2, 52.8,
    54.4, 56.0, 57.6, 59.2, 60.8, 62.4, 64.0, 65.6, 67.2, 68.8,
    70.4, 72.0, 73.6, 75.2, 76.8, 78.4, 80.0, 81.6,
];

/// Shelving/peaking frequency in Hz, also used for reverb HPF/LPF.
pub const EQ_FREQUENCY_HZ: [f32; 61] = [
    20.0, 22.0, 25.0, 28.0, 32.0, 36.0, 40.0, 45.0, 50.0, 56.0,
    63.0, 70.0, 80.0, 90.0, 100.0, 110.0, 125.0, 140.0, 160.0, 180.0,
    200.0, 225.0, 250.0, 280.0, 315.0, 355.0, 400.0, 450.0, 500.0, 560.0,
    630.0, 700.0, 800.0, 900.0, 1000.0, 1100.0, 1200.0, 1400.0, 1600.0, 1800.0,
    2000.0, 2200.0, 2500.0, 2800.0, 3200.0, 3600.0, 4000.0, 4500.0, 5000.0, 5600.0,
    6300.0, 7000.0, 8000.0, 9000.0, 10000.0, 11000.0, 12000.0, 14000.0, 16000.0, 18000.0,
    20000.0,
];

/// Reverb time in seconds for the hall, room, stage and plate types.
pub const REVERB_TIME_S: [f32; 70] = [
    0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 1.1, 1.2,
    1.3, 1.4, 1.5, 1.6, 1.7, 1.8, 1.9, 2.0, 2.1, 2.2,
    2.3, 2.4, 2.5, 2.6, 2.7, 2.8, 2.9, 3.0, 3.1, 3.2,
    3.3, 3.4, 3.5, 3.6, 3.7, 3.8, 3.9, 4.0, 4.1, 4.2,
    4.3, 4.4, 4.5, 4.6, 4.7, 4.8, 4.9, 5.0, 5.5, 6.0,
    6.5, 7.0, 7.5, 8.0, 8.5, 9.0, 9.5, 10.0, 11.0, 12.0,
    13.0, 14.0, 15.0, 16.0, 17.0, 18.0, 19.0, 20.0, 25.0, 30.0,
];

/// Width, height and depth of the white room, tunnel and basement types, in metres.
pub const ROOM_DIMENSION_M: [f32; 105] = [
    0.5, 0.8, 1.0, 1.3, 1.5, 1.8, 2.0, 2.3, 2.6, 2.8,
    3.1, 3.3, 3.6, 3.9, 4.1, 4.4, 4.6, 4.9, 5.2, 5.4,
    5.7, 5.9, 6.2, 6.5, 6.7, 7.0, 7.2, 7.5, 7.8, 8.0,
    8.3, 8.6, 8.8, 9.1, 9.4, 9.6, 9.9, 10.2, 10.4, 10.7,
    11.0, 11.2, 11.5, 11.8, 12.1, 12.3, 12.6, 12.9, 13.1, 13.4,
    13.7, 14.0, 14.2, 14.5, 14.8, 15.1, 15.4, 15.6, 15.9, 16.2,
    16.5, 16.8, 17.1, 17.3, 17.6, 17.9, 18.2, 18.5, 18.8, 19.1,
    19.4, 19.7, 20.0, 20.2, 20.5, 20.8, 21.1, 21.4, 21.7, 22.0,
    22.4, 22.7, 23.0, 23.3, 23.6, 23.9, 24.2, 24.5, 24.9, 25.2,
    25.5, 25.8, 26.1, 26.5, 26.8, 27.1, 27.5, 27.8, 28.1, 28.5,
    28.8, 29.2, 29.5, 29.9, 30.2,
];

/// Look `code` up in `table`, clamping codes past the end to the last entry.
pub fn lookup<const N: usize>(table: &[f32; N], code: u8) -> f32 {
    table[usize::from(code).min(N - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strictly_increasing(table: &[f32]) -> bool {
        table.windows(2).all(|w| w[0] < w[1])
    }

    #[test]
    fn tables_are_monotonic() {
        assert!(strictly_increasing(&LFO_FREQUENCY_HZ));
        assert!(strictly_increasing(&DELAY_OFFSET_MS));
        assert!(strictly_increasing(&EQ_FREQUENCY_HZ));
        assert!(strictly_increasing(&REVERB_TIME_S));
        assert!(strictly_increasing(&ROOM_DIMENSION_M));
    }

    #[test]
    fn irregular_steps_are_kept() {
        assert_eq!(LFO_FREQUENCY_HZ[12], 0.51);
        assert_eq!(LFO_FREQUENCY_HZ[64], 2.69);
        assert_eq!(LFO_FREQUENCY_HZ[65], 2.78);
        assert_eq!(LFO_FREQUENCY_HZ[127], 39.7);
        assert_eq!(DELAY_OFFSET_MS[63], 6.3);
        assert_eq!(DELAY_OFFSET_MS[64], 6.4);
        assert_eq!(DELAY_OFFSET_MS[96], 32.0);
        assert_eq!(DELAY_OFFSET_MS[127], 81.6);
        assert_eq!(REVERB_TIME_S[10], 1.3);
        assert_eq!(REVERB_TIME_S[47], 5.0);
        assert_eq!(REVERB_TIME_S[48], 5.5);
        assert_eq!(REVERB_TIME_S[69], 30.0);
        assert_eq!(EQ_FREQUENCY_HZ[34], 1000.0);
        assert_eq!(ROOM_DIMENSION_M[0], 0.5);
        assert_eq!(ROOM_DIMENSION_M[104], 30.2);
    }

    #[test]
    fn lookup_clamps() {
        assert_eq!(lookup(&REVERB_TIME_S, 127), 30.0);
        assert_eq!(lookup(&EQ_FREQUENCY_HZ, 60), 20000.0);
        assert_eq!(lookup(&EQ_FREQUENCY_HZ, 0), 20.0);
    }
}
