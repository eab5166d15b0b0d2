use chrono::NaiveDate;
use dicom_dictionary_std::tags;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::{Field, FieldValue, Record, RecordKind, ValueKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Study {
    pub study_instance_uid: Option<String>,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub study_date: Option<NaiveDate>,
    pub accession_number: Option<String>,
    pub study_description: Option<String>,
    pub modalities_in_study: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Series {
    pub series_instance_uid: Option<String>,
    pub study_instance_uid: Option<String>,
    pub modality: Option<String>,
    pub series_number: Option<i64>,
    pub series_description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Image {
    pub sop_instance_uid: Option<String>,
    pub sop_class_uid: Option<String>,
    pub series_instance_uid: Option<String>,
    pub study_instance_uid: Option<String>,
    pub instance_number: Option<i64>,
}

fn text(value: &Option<String>) -> Option<FieldValue> {
    value.clone().map(FieldValue::Text)
}

fn date(value: &Option<NaiveDate>) -> Option<FieldValue> {
    value.map(FieldValue::Date)
}

fn integer(value: &Option<i64>) -> Option<FieldValue> {
    value.map(FieldValue::Integer)
}

static PATIENT_FIELDS: Lazy<Vec<Field<Patient>>> = Lazy::new(|| {
    vec![
        Field::new(
            tags::PATIENT_ID,
            "PatientID",
            ValueKind::Text,
            |p: &Patient| text(&p.patient_id),
            |p: &mut Patient, v| p.patient_id = v.into_text(),
        )
        .identity(),
        Field::new(
            tags::PATIENT_NAME,
            "PatientName",
            ValueKind::Text,
            |p: &Patient| text(&p.patient_name),
            |p: &mut Patient, v| p.patient_name = v.into_text(),
        ),
        Field::new(
            tags::PATIENT_BIRTH_DATE,
            "PatientBirthDate",
            ValueKind::Date,
            |p: &Patient| date(&p.birth_date),
            |p: &mut Patient, v| p.birth_date = v.into_date(),
        ),
        Field::new(
            tags::PATIENT_SEX,
            "PatientSex",
            ValueKind::Text,
            |p: &Patient| text(&p.sex),
            |p: &mut Patient, v| p.sex = v.into_text(),
        ),
    ]
});

static STUDY_FIELDS: Lazy<Vec<Field<Study>>> = Lazy::new(|| {
    vec![
        Field::new(
            tags::STUDY_INSTANCE_UID,
            "StudyInstanceUID",
            ValueKind::Text,
            |s: &Study| text(&s.study_instance_uid),
            |s: &mut Study, v| s.study_instance_uid = v.into_text(),
        )
        .identity(),
        Field::new(
            tags::PATIENT_ID,
            "PatientID",
            ValueKind::Text,
            |s: &Study| text(&s.patient_id),
            |s: &mut Study, v| s.patient_id = v.into_text(),
        ),
        Field::new(
            tags::PATIENT_NAME,
            "PatientName",
            ValueKind::Text,
            |s: &Study| text(&s.patient_name),
            |s: &mut Study, v| s.patient_name = v.into_text(),
        ),
        Field::new(
            tags::STUDY_DATE,
            "StudyDate",
            ValueKind::Date,
            |s: &Study| date(&s.study_date),
            |s: &mut Study, v| s.study_date = v.into_date(),
        ),
        Field::new(
            tags::ACCESSION_NUMBER,
            "AccessionNumber",
            ValueKind::Text,
            |s: &Study| text(&s.accession_number),
            |s: &mut Study, v| s.accession_number = v.into_text(),
        ),
        Field::new(
            tags::STUDY_DESCRIPTION,
            "StudyDescription",
            ValueKind::Text,
            |s: &Study| text(&s.study_description),
            |s: &mut Study, v| s.study_description = v.into_text(),
        ),
        Field::new(
            tags::MODALITIES_IN_STUDY,
            "ModalitiesInStudy",
            ValueKind::Text,
            |s: &Study| text(&s.modalities_in_study),
            |s: &mut Study, v| s.modalities_in_study = v.into_text(),
        ),
    ]
});

static SERIES_FIELDS: Lazy<Vec<Field<Series>>> = Lazy::new(|| {
    vec![
        Field::new(
            tags::SERIES_INSTANCE_UID,
            "SeriesInstanceUID",
            ValueKind::Text,
            |s: &Series| text(&s.series_instance_uid),
            |s: &mut Series, v| s.series_instance_uid = v.into_text(),
        )
        .identity(),
        Field::new(
            tags::STUDY_INSTANCE_UID,
            "StudyInstanceUID",
            ValueKind::Text,
            |s: &Series| text(&s.study_instance_uid),
            |s: &mut Series, v| s.study_instance_uid = v.into_text(),
        ),
        Field::new(
            tags::MODALITY,
            "Modality",
            ValueKind::Text,
            |s: &Series| text(&s.modality),
            |s: &mut Series, v| s.modality = v.into_text(),
        ),
        Field::new(
            tags::SERIES_NUMBER,
            "SeriesNumber",
            ValueKind::Integer,
            |s: &Series| integer(&s.series_number),
            |s: &mut Series, v| s.series_number = v.into_integer(),
        ),
        Field::new(
            tags::SERIES_DESCRIPTION,
            "SeriesDescription",
            ValueKind::Text,
            |s: &Series| text(&s.series_description),
            |s: &mut Series, v| s.series_description = v.into_text(),
        ),
    ]
});

static IMAGE_FIELDS: Lazy<Vec<Field<Image>>> = Lazy::new(|| {
    vec![
        Field::new(
            tags::SOP_INSTANCE_UID,
            "SOPInstanceUID",
            ValueKind::Text,
            |i: &Image| text(&i.sop_instance_uid),
            |i: &mut Image, v| i.sop_instance_uid = v.into_text(),
        )
        .identity(),
        Field::new(
            tags::SOP_CLASS_UID,
            "SOPClassUID",
            ValueKind::Text,
            |i: &Image| text(&i.sop_class_uid),
            |i: &mut Image, v| i.sop_class_uid = v.into_text(),
        ),
        Field::new(
            tags::SERIES_INSTANCE_UID,
            "SeriesInstanceUID",
            ValueKind::Text,
            |i: &Image| text(&i.series_instance_uid),
            |i: &mut Image, v| i.series_instance_uid = v.into_text(),
        ),
        Field::new(
            tags::STUDY_INSTANCE_UID,
            "StudyInstanceUID",
            ValueKind::Text,
            |i: &Image| text(&i.study_instance_uid),
            |i: &mut Image, v| i.study_instance_uid = v.into_text(),
        ),
        Field::new(
            tags::INSTANCE_NUMBER,
            "InstanceNumber",
            ValueKind::Integer,
            |i: &Image| integer(&i.instance_number),
            |i: &mut Image, v| i.instance_number = v.into_integer(),
        ),
    ]
});

impl Record for Patient {
    const KIND: RecordKind = RecordKind::Patient;

    fn fields() -> &'static [Field<Self>] {
        PATIENT_FIELDS.as_slice()
    }
}

impl Record for Study {
    const KIND: RecordKind = RecordKind::Study;

    fn fields() -> &'static [Field<Self>] {
        STUDY_FIELDS.as_slice()
    }
}

impl Record for Series {
    const KIND: RecordKind = RecordKind::Series;

    fn fields() -> &'static [Field<Self>] {
        SERIES_FIELDS.as_slice()
    }
}

impl Record for Image {
    const KIND: RecordKind = RecordKind::Image;

    fn fields() -> &'static [Field<Self>] {
        IMAGE_FIELDS.as_slice()
    }
}
