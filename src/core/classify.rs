//! Classification of single photos.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::evaluator::{CompiledFunction, Evaluator};
use super::fields::{FieldCache, FieldKey, FieldSource};
use super::strategy::Role;
use crate::domain::photo::PhotoInfo;
use crate::domain::policy::{ClassificationFieldType, ClassificationPolicy};
use crate::error::{Error, Result, Stage};

impl ClassificationPolicy {
    /// Select the raw field this policy classifies on
    pub async fn extract(&self, photo: &PhotoInfo, source: &dyn FieldSource) -> Result<String> {
        match self.field_type {
            ClassificationFieldType::Name => Ok(photo.file_name.clone()),
            ClassificationFieldType::ExifInfo => photo
                .exif_info
                .get(&self.field_name)
                .map(str::to_string)
                .ok_or_else(|| Error::MissingField {
                    photo_id: photo.id.clone(),
                    field: format!("exif:{}", self.field_name),
                }),
            ClassificationFieldType::Property => source
                .property(photo, &self.field_name)
                .await?
                .ok_or_else(|| Error::MissingField {
                    photo_id: photo.id.clone(),
                    field: format!("property:{}", self.field_name),
                }),
            ClassificationFieldType::Content => {
                let bytes = source.content(photo).await?;
                Ok(BASE64.encode(bytes))
            }
        }
    }

    /// Extract and evaluate in one go, outside of a pipeline run
    pub async fn classify(
        &self,
        evaluator: &Evaluator,
        photo: &PhotoInfo,
        source: &dyn FieldSource,
    ) -> Result<String> {
        let classifier = LevelClassifier::compile(self, evaluator, Stage::Standalone)?;
        let mut cache = FieldCache::new();
        classifier.classify(evaluator, photo, source, &mut cache).await
    }
}

/// A classification policy compiled for one pipeline run
#[derive(Debug)]
pub struct LevelClassifier<'p> {
    policy: &'p ClassificationPolicy,
    function: CompiledFunction,
    stage: Stage,
}

impl<'p> LevelClassifier<'p> {
    pub fn compile(policy: &'p ClassificationPolicy, evaluator: &Evaluator, stage: Stage) -> Result<Self> {
        let function = evaluator.compile(&policy.func, Role::Classify, stage)?;
        Ok(Self {
            policy,
            function,
            stage,
        })
    }

    /// Label of one photo. The raw field is taken from `cache` when an
    /// earlier level already extracted it.
    pub async fn classify(
        &self,
        evaluator: &Evaluator,
        photo: &PhotoInfo,
        source: &dyn FieldSource,
        cache: &mut FieldCache,
    ) -> Result<String> {
        let key = FieldKey::new(&photo.id, self.policy.field_type, &self.policy.field_name);

        let raw = match cache.get(&key) {
            Some(value) => value.to_string(),
            None => {
                let value = self.policy.extract(photo, source).await?;
                cache.insert(key, value.clone());
                value
            }
        };

        evaluator
            .classify(&self.function, &raw)
            .map_err(|e| Error::evaluation(self.stage, format!("photo {}", photo.id), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fields::RecordFields;
    use crate::domain::photo::ExifInfo;
    use crate::domain::policy::PolicyFunction;

    fn photo() -> PhotoInfo {
        PhotoInfo::new(
            "p1",
            "IMG_2021.jpg",
            ExifInfo::new([("Model", "X100V")]),
            "",
        )
    }

    #[tokio::test]
    async fn test_extract_fields() {
        let by_name = ClassificationPolicy::by_name(PolicyFunction::passthrough());
        assert_eq!(by_name.extract(&photo(), &RecordFields).await.unwrap(), "IMG_2021.jpg");

        let by_exif = ClassificationPolicy::by_exif("Model", PolicyFunction::passthrough());
        assert_eq!(by_exif.extract(&photo(), &RecordFields).await.unwrap(), "X100V");

        let by_property = ClassificationPolicy::new(
            ClassificationFieldType::Property,
            "stem",
            PolicyFunction::passthrough(),
        );
        assert_eq!(by_property.extract(&photo(), &RecordFields).await.unwrap(), "IMG_2021");
    }

    #[tokio::test]
    async fn test_missing_exif_tag() {
        let policy = ClassificationPolicy::by_exif("LensModel", PolicyFunction::passthrough());
        let err = policy.extract(&photo(), &RecordFields).await.unwrap_err();
        match err {
            Error::MissingField { photo_id, field } => {
                assert_eq!(photo_id, "p1");
                assert_eq!(field, "exif:LensModel");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_property() {
        let policy = ClassificationPolicy::new(
            ClassificationFieldType::Property,
            "rating",
            PolicyFunction::passthrough(),
        );
        assert!(matches!(
            policy.extract(&photo(), &RecordFields).await,
            Err(Error::MissingField { .. })
        ));
    }

    #[tokio::test]
    async fn test_classify_with_regex() {
        let policy = ClassificationPolicy::by_name(PolicyFunction::regex_extract(r"\d{4}"));
        let label = policy
            .classify(&Evaluator::default(), &photo(), &RecordFields)
            .await
            .unwrap();
        assert_eq!(label, "2021");
    }
}
