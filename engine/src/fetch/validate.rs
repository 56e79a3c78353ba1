//! Fragmented-container content validation (§4.3): the first eight bytes of
//! a genuine segment are an ISOBMFF box header whose type is one the
//! just-in-time transcoder can legitimately emit.

const VALID_BOX_TYPES: [&str; 6] = ["ftyp", "styp", "moof", "mdat", "sidx", "free"];

/// The box type named by the first eight bytes, if those bytes parse as an
/// ISOBMFF box header (4-byte size, 4-byte ASCII type).
pub fn sniff_box_type(bytes: &[u8]) -> Option<&str> {
    let header = bytes.get(..8)?;
    std::str::from_utf8(&header[4..8]).ok()
}

pub fn is_recognized_fragment(bytes: &[u8]) -> bool {
    sniff_box_type(bytes).is_some_and(|t| VALID_BOX_TYPES.contains(&t))
}

pub fn looks_like_json(bytes: &[u8]) -> bool {
    matches!(bytes.first(), Some(b'{') | Some(b'['))
}
