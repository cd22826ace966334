//! Serde helper modules for BSON representations that
//! `bson::serde_helpers` doesn't cover: `Option` and `Vec` wrappers around
//! uuid and datetime fields.

pub mod uuid_opt_as_binary {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(value: &Option<Uuid>, s: S) -> Result<S::Ok, S::Error> {
        value.map(bson::Uuid::from).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Uuid>, D::Error> {
        Ok(Option::<bson::Uuid>::deserialize(d)?.map(Into::into))
    }
}

pub mod uuid_vec_as_binary {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(value: &[Uuid], s: S) -> Result<S::Ok, S::Error> {
        value
            .iter()
            .copied()
            .map(bson::Uuid::from)
            .collect::<Vec<_>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Uuid>, D::Error> {
        Ok(Vec::<bson::Uuid>::deserialize(d)?
            .into_iter()
            .map(Into::into)
            .collect())
    }
}

pub mod chrono_opt_as_bson_datetime {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        value.map(bson::DateTime::from_chrono).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(Option::<bson::DateTime>::deserialize(d)?.map(|dt| dt.to_chrono()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{SubsecRound, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "super::uuid_opt_as_binary")]
        parent: Option<Uuid>,
        #[serde(with = "super::uuid_vec_as_binary")]
        staff: Vec<Uuid>,
        #[serde(with = "super::chrono_opt_as_bson_datetime")]
        completed_at: Option<chrono::DateTime<Utc>>,
    }

    #[test]
    fn bson_roundtrip() {
        let sample = Sample {
            parent: Some(Uuid::new_v4()),
            staff: vec![Uuid::new_v4(), Uuid::new_v4()],
            completed_at: Some(Utc::now().round_subsecs(3)),
        };
        let doc = bson::to_document(&sample).unwrap();
        let back: Sample = bson::from_document(doc).unwrap();
        assert_eq!(sample, back);
    }

    #[test]
    fn bson_roundtrip_absent_options() {
        let sample = Sample {
            parent: None,
            staff: vec![],
            completed_at: None,
        };
        let doc = bson::to_document(&sample).unwrap();
        let back: Sample = bson::from_document(doc).unwrap();
        assert_eq!(sample, back);
    }
}
