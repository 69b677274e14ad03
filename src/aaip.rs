// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! AAIP integration hooks: attaches an opaque, caller-built AAIP component
//! stream to a node's [`xinfo`](crate::node::NodeAttributes::xinfo) map and frames it into one or
//! more `AA` SUSP entries alongside the rest of a node's Rock Ridge fields.
//!
//! The bit-level AAIP payload format (ACL/xattr encoding proper) is out of scope here; only its
//! *integration* into the writer pipeline is handled. Callers that want extended attributes or
//! POSIX ACLs on a node build the AAIP component stream themselves and hand it to
//! [`set_payload`]; this module only knows how to store that blob and split it across `AA`
//! entries the way [`crate::rockridge`] splits long names across `NM` entries.

use std::rc::Rc;

use crate::node::NodeAttributes;

/// The [`NodeAttributes::xinfo`] key under which a node's AAIP component stream is stored.
pub const XINFO_KEY: &str = "AAIP";

/// Maximum payload bytes one `AA` entry can carry: the 255-byte SUSP entry cap minus the 5-byte
/// header (signature, length, version, continuation flag).
const AA_ENTRY_PAYLOAD_MAX: usize = 250;

/// Attaches an AAIP component stream to a node, replacing any previous one.
pub fn set_payload(attrs: &mut NodeAttributes, payload: Vec<u8>) {
    attrs.xinfo.insert(XINFO_KEY.to_string(), Rc::new(payload));
}

/// Returns the node's AAIP component stream, if any.
pub fn payload(attrs: &NodeAttributes) -> Option<Rc<Vec<u8>>> {
    attrs.xinfo.get(XINFO_KEY).cloned()
}

/// Removes a node's AAIP component stream, if any.
pub fn clear_payload(attrs: &mut NodeAttributes) {
    attrs.xinfo.remove(XINFO_KEY);
}

/// Splits an AAIP component stream into one or more `AA` SUSP entries, each length-bounded to fit
/// the remaining System Use Area budget. Each entry's flag byte has bit 0 set when another `AA`
/// entry continues the stream, mirroring how [`crate::rockridge`]'s `NM` continuation bit works.
pub fn encode_aa_entries(payload: &[u8]) -> Vec<Vec<u8>> {
    if payload.is_empty() {
        return Vec::new();
    }
    let mut entries = Vec::new();
    let mut remaining = payload;
    loop {
        let take = remaining.len().min(AA_ENTRY_PAYLOAD_MAX);
        let (chunk, rest) = remaining.split_at(take);
        let continues = !rest.is_empty();
        let mut out = Vec::with_capacity(5 + chunk.len());
        out.extend_from_slice(b"AA");
        out.push((5 + chunk.len()) as u8);
        out.push(1); // version
        out.push(if continues { 1 } else { 0 });
        out.extend_from_slice(chunk);
        entries.push(out);
        if !continues {
            break;
        }
        remaining = rest;
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::susp::PosixFileMode;

    #[test]
    fn short_payload_is_one_entry() {
        let entries = encode_aa_entries(b"acl-blob");
        assert_eq!(entries.len(), 1);
        assert_eq!(&entries[0][0..2], b"AA");
        assert_eq!(entries[0][3], 0); // no continuation
    }

    #[test]
    fn long_payload_splits_with_continuation_bits() {
        let payload = vec![0x42u8; AA_ENTRY_PAYLOAD_MAX + 10];
        let entries = encode_aa_entries(&payload);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0][3], 1); // continues
        assert_eq!(entries[1][3], 0); // last
        let total: usize = entries.iter().map(|e| e.len() - 5).sum();
        assert_eq!(total, payload.len());
    }

    #[test]
    fn empty_payload_yields_no_entries() {
        assert!(encode_aa_entries(&[]).is_empty());
    }

    #[test]
    fn set_and_get_payload_round_trips_through_xinfo() {
        let mut attrs = NodeAttributes::new("node", PosixFileMode::from_bits_truncate(0o644));
        assert!(payload(&attrs).is_none());
        set_payload(&mut attrs, vec![1, 2, 3]);
        assert_eq!(payload(&attrs).unwrap().as_slice(), &[1, 2, 3]);
        clear_payload(&mut attrs);
        assert!(payload(&attrs).is_none());
    }
}
