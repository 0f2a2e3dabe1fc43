/// Configuration recognized by the core and its external collaborators.
///
/// Only the fields the core itself consults (`num_terms`, `max_cycles`,
/// `max_memory`) change core behavior; the rest are carried verbatim for
/// the external generator/miner collaborators (see spec §6) and are never
/// read by the interpreter, incremental evaluator, or formula generator.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// How many terms to produce for evaluations.
    pub num_terms: usize,
    /// Interpreter cycle ceiling.
    pub max_cycles: u64,
    /// Highest legal memory cell index.
    pub max_memory: u64,

    // Used only by the external program generator.
    pub max_constant: i64,
    pub max_index: i64,
    pub num_operations: usize,

    // Used only by the external mining collaborator.
    pub miner_profile: Option<String>,
    pub num_mine_hours: Option<u64>,
    pub parallel_mining: bool,
    pub num_miner_instances: usize,
    pub optimize_existing_programs: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            num_terms: 10,
            max_cycles: 10_000_000,
            max_memory: 100,
            max_constant: 0,
            max_index: 0,
            num_operations: 0,
            miner_profile: None,
            num_mine_hours: None,
            parallel_mining: false,
            num_miner_instances: 1,
            optimize_existing_programs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.num_terms, 10);
        assert_eq!(s.max_cycles, 10_000_000);
        assert_eq!(s.max_memory, 100);
    }
}
