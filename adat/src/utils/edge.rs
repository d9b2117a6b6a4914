/// Converts every rising edge of a level into a pulse lasting one tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct EdgeDetector {
    last: bool,
}

impl EdgeDetector {
    #[inline(always)]
    pub fn step(&mut self, level: bool) -> bool {
        let pulse = level && !self.last;
        self.last = level;
        pulse
    }

    /// Forgets the previous level; a level already high at the next step
    /// produces a pulse again.
    pub fn reset(&mut self) {
        self.last = false;
    }
}

#[test]
fn rising_edges_become_single_pulses() {
    let mut detector = EdgeDetector::default();
    let levels = [0, 0, 1, 1, 1, 0, 1, 0, 1, 1, 0];
    let pulses = levels
        .iter()
        .map(|&l| detector.step(l == 1) as u8)
        .collect::<Vec<_>>();

    assert_eq!(pulses, [0, 0, 1, 0, 0, 0, 1, 0, 1, 0, 0]);
}

#[test]
fn reset_rearms_a_held_level() {
    let mut detector = EdgeDetector::default();
    assert!(detector.step(true));
    assert!(!detector.step(true));
    detector.reset();
    assert!(detector.step(true));
}
