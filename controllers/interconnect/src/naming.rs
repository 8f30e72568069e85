//! Deterministic object names.
//!
//! Names derived here must be stable across restarts and releases: existing
//! objects are looked up by recomputing them. The hash is FNV-1a 32 over the
//! JSON array of the key parts, rendered in decimal and re-encoded with a
//! DNS-label-safe alphabet.

/// Alphabet without vowels or easily confused characters
const SAFE_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Map every character of `s` onto the safe alphabet
pub fn safe_encode(s: &str) -> String {
    s.bytes()
        .map(|b| char::from(SAFE_ALPHABET[usize::from(b) % SAFE_ALPHABET.len()]))
        .collect()
}

/// Hash of the ordered key parts
pub fn hash(keys: &[&str]) -> String {
    // A JSON array of strings cannot fail to serialize; fall back to the
    // plain join so the name stays deterministic regardless.
    let json = serde_json::to_string(keys).unwrap_or_else(|_| keys.join(","));
    safe_encode(&fnv1a32(json.as_bytes()).to_string())
}

/// `<network>-<cluster>`
pub fn network_cluster_name(network: &str, cluster: &str) -> String {
    format!("{}-{}", network, cluster)
}

/// `<network>-h(cluster, service namespace, service name)`
pub fn network_service_name(network: &str, cluster: &str, service_namespace: &str, service_name: &str) -> String {
    format!("{}-{}", network, hash(&[cluster, service_namespace, service_name]))
}

/// `<network>-h(hub, spoke)`
pub fn network_link_name(network: &str, hub: &str, spoke: &str) -> String {
    format!("{}-{}", network, hash(&[hub, spoke]))
}

/// Canonical orientation of a fabric link between two clusters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkName {
    /// Alphabetically first cluster
    pub source: String,
    /// Alphabetically second cluster
    pub target: String,
    /// `<target>-h(source, target)`
    pub name: String,
}

/// Name and orientation of the fabric Link joining `a` and `b`.
///
/// Symmetric: `link_name(a, b) == link_name(b, a)`.
pub fn link_name(a: &str, b: &str) -> LinkName {
    let (source, target) = if a <= b { (a, b) } else { (b, a) };
    LinkName {
        source: source.to_string(),
        target: target.to_string(),
        name: format!("{}-{}", target, hash(&[source, target])),
    }
}

/// `<cluster>-h(cluster namespace, service name)`
pub fn service_name(cluster: &str, cluster_namespace: &str, service: &str) -> String {
    format!("{}-{}", cluster, hash(&[cluster_namespace, service]))
}
