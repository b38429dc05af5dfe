use spire_wire::ConfigMessage;

/// Number of control-center replicas a single `send(update)` call targets
/// (spec §4.3 step 1): `min(f+k+1, 2·(f+2))`.
pub fn control_center_fanout(config: &ConfigMessage) -> usize {
    let required = config.f as usize + config.k as usize + 1;
    let ceiling = 2 * (config.f as usize + 2);
    required.min(ceiling)
}
