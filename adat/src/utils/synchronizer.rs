/// Two-stage re-sampler for a level entering a timing domain.
///
/// The value presented at tick `n` becomes visible at tick `n + 2`, so a
/// reader never observes a value that changed during its own tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct Synchronizer {
    stages: [bool; 2],
}

impl Synchronizer {
    #[inline(always)]
    pub fn step(&mut self, input: bool) -> bool {
        let output = self.stages[1];
        self.stages = [input, self.stages[0]];
        output
    }
}

#[test]
fn delays_by_two_ticks() {
    let mut sync = Synchronizer::default();
    let input = [1, 1, 0, 1, 0, 0, 0];
    let output = input
        .iter()
        .map(|&v| sync.step(v == 1) as u8)
        .collect::<Vec<_>>();

    assert_eq!(output, [0, 0, 1, 1, 0, 1, 0]);
}
