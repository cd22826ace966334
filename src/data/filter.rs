//! Query filter helpers. Documents store UUIDs as BSON binary (subtype 4), so
//! every filter on an id field has to wrap the uuid accordingly.

use bson::spec::BinarySubtype;
use bson::{doc, Bson, Document};
use uuid::Uuid;

#[inline]
pub fn uuid_bson(id: Uuid) -> Bson {
    Bson::Binary(bson::Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.as_bytes().to_vec(),
    })
}

#[inline]
pub fn uuid_bson_array(ids: &[Uuid]) -> Bson {
    Bson::Array(ids.iter().copied().map(uuid_bson).collect())
}

#[inline]
pub fn by_id(id: Uuid) -> Document {
    doc! { "_id": uuid_bson(id) }
}

#[inline]
pub fn by_ids(ids: &[Uuid]) -> Document {
    doc! { "_id": { "$in": uuid_bson_array(ids) } }
}

/// Case-insensitive substring match, used for catalog and project search.
#[inline]
pub fn regex_contains(field: &str, needle: &str) -> Document {
    doc! { field: { "$regex": regex_escape(needle), "$options": "i" } }
}

/// Escapes regex metacharacters so user input only ever matches literally.
fn regex_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_filter_uses_uuid_binary() {
        let id = Uuid::new_v4();
        let filter = by_id(id);
        match filter.get("_id") {
            Some(Bson::Binary(bin)) => {
                assert_eq!(bin.subtype, BinarySubtype::Uuid);
                assert_eq!(bin.bytes, id.as_bytes().to_vec());
            }
            other => panic!("expected binary _id filter, got {:?}", other),
        }
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert_eq!(regex_escape("c++ (v2)"), "c\\+\\+ \\(v2\\)");
        assert_eq!(regex_escape("plain"), "plain");
    }
}
