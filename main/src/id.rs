/// Derives the registry ID of the device listening at `address:port`.
///
/// Dots and the port separator become underscores, e.g. `192.168.1.5:80`
/// becomes `192_168_1_5_80`. Distinct IPv4 endpoints always map to distinct IDs
/// because every component is a plain number. Host names containing `_` may
/// collide with each other.
pub fn device_id(address: &str, port: u16) -> String {
    format!("{}:{}", address, port)
        .replace('.', "_")
        .replacen(':', "_", 1)
}

/// Prefixes a device ID with the instance namespace, as used for room members
/// and device listings.
pub fn qualify(namespace: &str, id: &str) -> String {
    format!("{}.{}", namespace, id)
}

/// Strips the instance namespace from a qualified ID. Bare IDs pass through.
pub fn unqualify<'a>(namespace: &str, id: &'a str) -> &'a str {
    id.strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(id)
}
