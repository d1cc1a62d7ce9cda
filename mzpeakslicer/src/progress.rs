use std::ops::{Add, AddAssign};

/// Counts of what was read from the input file
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ReadRecord {
    pub ms1_spectra: usize,
    pub msn_spectra: usize,
    pub ms1_peaks: usize,
    pub msn_peaks: usize,
    pub ion_mobility_spectra: usize,
    pub centroided_spectra: usize,
}

impl ReadRecord {
    pub fn sum(self, rhs: Self) -> Self {
        self + rhs
    }
}

impl Add for ReadRecord {
    type Output = ReadRecord;

    fn add(self, rhs: Self) -> Self::Output {
        let mut dup = self;
        dup += rhs;
        dup
    }
}

impl AddAssign for ReadRecord {
    fn add_assign(&mut self, rhs: Self) {
        self.ms1_spectra += rhs.ms1_spectra;
        self.msn_spectra += rhs.msn_spectra;
        self.ms1_peaks += rhs.ms1_peaks;
        self.msn_peaks += rhs.msn_peaks;
        self.ion_mobility_spectra += rhs.ion_mobility_spectra;
        self.centroided_spectra += rhs.centroided_spectra;
    }
}
