//! Configuration layer merging logic
//!
//! Layers are merged as raw TOML tables so that a key the repository file
//! leaves unset does not reset a value the user file chose.

/// Merge `layer` into `base`. Tables merge recursively; any other value in
/// `layer` replaces the one in `base`, arrays included.
pub fn merge_layers(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_layers(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
