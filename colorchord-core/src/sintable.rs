//! Sine lookup shared by every correlator in the bank.

/// 256 entries of `sin(i / 256 * 2pi) * 1500`, truncated toward zero.
///
/// The amplitude is bounded at 1500 so that `table * i16 sample` cannot
/// overflow an `i32` product. Cosine is read at `index + 64`.
pub const SIN_TABLE: [i16; 256] = [
        0,    36,    73,   110,   147,   183,   220,   256,
      292,   328,   364,   400,   435,   470,   505,   539,
      574,   607,   641,   674,   707,   739,   771,   802,
      833,   863,   893,   922,   951,   979,  1007,  1034,
     1060,  1086,  1111,  1135,  1159,  1182,  1204,  1226,
     1247,  1267,  1286,  1305,  1322,  1339,  1355,  1371,
     1385,  1399,  1412,  1424,  1435,  1445,  1455,  1463,
     1471,  1477,  1483,  1488,  1492,  1495,  1498,  1499,
     1500,  1499,  1498,  1495,  1492,  1488,  1483,  1477,
     1471,  1463,  1455,  1445,  1435,  1424,  1412,  1399,
     1385,  1371,  1356,  1339,  1322,  1305,  1286,  1267,
     1247,  1226,  1204,  1182,  1159,  1135,  1111,  1086,
     1060,  1034,  1007,   979,   951,   922,   893,   863,
      833,   802,   771,   739,   707,   674,   641,   607,
      574,   539,   505,   470,   435,   400,   364,   328,
      292,   256,   220,   183,   147,   110,    73,    36,
        0,   -36,   -73,  -110,  -146,  -183,  -219,  -256,
     -292,  -328,  -364,  -399,  -435,  -470,  -505,  -539,
     -573,  -607,  -641,  -674,  -706,  -739,  -771,  -802,
     -833,  -863,  -893,  -922,  -951,  -979, -1007, -1034,
    -1060, -1086, -1111, -1135, -1159, -1182, -1204, -1226,
    -1247, -1267, -1286, -1305, -1322, -1339, -1355, -1371,
    -1385, -1399, -1412, -1424, -1435, -1445, -1454, -1463,
    -1471, -1477, -1483, -1488, -1492, -1495, -1498, -1499,
    -1500, -1499, -1498, -1495, -1492, -1488, -1483, -1477,
    -1471, -1463, -1455, -1445, -1435, -1424, -1412, -1399,
    -1385, -1371, -1356, -1339, -1322, -1305, -1286, -1267,
    -1247, -1226, -1204, -1182, -1159, -1135, -1111, -1086,
    -1060, -1034, -1007,  -979,  -951,  -923,  -893,  -863,
     -833,  -802,  -771,  -739,  -707,  -674,  -641,  -608,
     -574,  -540,  -505,  -470,  -435,  -400,  -364,  -328,
     -292,  -256,  -220,  -183,  -147,  -110,   -73,   -37,
];

/// Sine at a 256-step phase index.
#[inline]
pub fn sin_at(index: u8) -> i32 {
    SIN_TABLE[index as usize] as i32
}

/// Cosine at a 256-step phase index (quarter turn ahead, wraps mod 256).
#[inline]
pub fn cos_at(index: u8) -> i32 {
    SIN_TABLE[index.wrapping_add(64) as usize] as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_bounded() {
        assert!(SIN_TABLE.iter().all(|&v| (-1500..=1500).contains(&v)));
        assert_eq!(SIN_TABLE[0], 0);
        assert_eq!(SIN_TABLE[64], 1500);
        assert_eq!(SIN_TABLE[192], -1500);
    }

    #[test]
    fn cosine_is_quarter_turn_ahead() {
        assert_eq!(cos_at(0), 1500);
        assert_eq!(cos_at(128), -1500);
        assert_eq!(cos_at(192), 0);
        assert_eq!(cos_at(255), sin_at(63));
    }
}
