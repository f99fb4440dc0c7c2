//! The cause catalogue: display names and group codes for the 70 cause columns.
//!
//! The catalogue is built once per run from the probability base header and shared by
//! every distribution through an `Arc`, so results never carry their own copy of the
//! cause names.

use crate::types::{Block, CAUSE_COUNT, CauseIndex};
use ahash::AHashMap;

/// (column code, display name, group code) for the reference cause columns.
const STANDARD_CAUSES: [(&str, &str, Option<&str>); CAUSE_COUNT] = [
    ("a_nrp", "Not pregnant or recently delivered", None),
    ("a_pend_6w", "Pregnancy ended within 6 weeks of death", None),
    ("a_preg", "Pregnant at death", None),
    ("b_0101", "Sepsis (non-obstetric)", Some("01.01")),
    ("b_0102", "Acute resp infect incl pneumonia", Some("01.02")),
    ("b_0103", "HIV/AIDS related death", Some("01.03")),
    ("b_0104", "Diarrhoeal diseases", Some("01.04")),
    ("b_0105", "Malaria", Some("01.05")),
    ("b_0106", "Measles", Some("01.06")),
    ("b_0107", "Meningitis and encephalitis", Some("01.07")),
    ("b_0108", "Tetanus", Some("01.08")),
    ("b_0109", "Pulmonary tuberculosis", Some("01.09")),
    ("b_0110", "Pertussis", Some("01.10")),
    ("b_0111", "Haemorrhagic fever (non-dengue)", Some("01.11")),
    ("b_0112", "Dengue fever", Some("01.12")),
    ("b_0199", "Other and unspecified infect dis", Some("01.99")),
    ("b_0201", "Oral neoplasms", Some("02.01")),
    ("b_0202", "Digestive neoplasms", Some("02.02")),
    ("b_0203", "Respiratory neoplasms", Some("02.03")),
    ("b_0204", "Breast neoplasms", Some("02.04")),
    ("b_0205", "Reproductive neoplasms MF", Some("02.05")),
    ("b_0299", "Other and unspecified neoplasms", Some("02.99")),
    ("b_0301", "Severe anaemia", Some("03.01")),
    ("b_0302", "Severe malnutrition", Some("03.02")),
    ("b_0303", "Diabetes mellitus", Some("03.03")),
    ("b_0401", "Acute cardiac disease", Some("04.01")),
    ("b_0402", "Stroke", Some("04.02")),
    ("b_0403", "Sickle cell with crisis", Some("04.03")),
    ("b_0499", "Other and unspecified cardiac dis", Some("04.99")),
    ("b_0501", "Chronic obstructive pulmonary dis", Some("05.01")),
    ("b_0502", "Asthma", Some("05.02")),
    ("b_0601", "Acute abdomen", Some("06.01")),
    ("b_0602", "Liver cirrhosis", Some("06.02")),
    ("b_0701", "Renal failure", Some("07.01")),
    ("b_0801", "Epilepsy", Some("08.01")),
    ("b_0901", "Ectopic pregnancy", Some("09.01")),
    ("b_0902", "Abortion-related death", Some("09.02")),
    ("b_0903", "Pregnancy-induced hypertension", Some("09.03")),
    ("b_0904", "Obstetric haemorrhage", Some("09.04")),
    ("b_0905", "Obstructed labour", Some("09.05")),
    ("b_0906", "Pregnancy-related sepsis", Some("09.06")),
    ("b_0907", "Anaemia of pregnancy", Some("09.07")),
    ("b_0908", "Ruptured uterus", Some("09.08")),
    ("b_0999", "Other and unspecified maternal CoD", Some("09.99")),
    ("b_1001", "Prematurity", Some("10.01")),
    ("b_1002", "Birth asphyxia", Some("10.02")),
    ("b_1003", "Neonatal pneumonia", Some("10.03")),
    ("b_1004", "Neonatal sepsis", Some("10.04")),
    ("b_1006", "Congenital malformation", Some("10.06")),
    ("b_1099", "Other and unspecified neonatal CoD", Some("10.99")),
    ("b_1101", "Fresh stillbirth", Some("11.01")),
    ("b_1102", "Macerated stillbirth", Some("11.02")),
    ("b_1201", "Road traffic accident", Some("12.01")),
    ("b_1202", "Other transport accident", Some("12.02")),
    ("b_1203", "Accid fall", Some("12.03")),
    ("b_1204", "Accid drowning and submersion", Some("12.04")),
    ("b_1205", "Accid expos to smoke fire & flame", Some("12.05")),
    ("b_1206", "Contact with venomous plant/animal", Some("12.06")),
    ("b_1207", "Accid poisoning & noxious subs", Some("12.07")),
    ("b_1208", "Intentional self-harm", Some("12.08")),
    ("b_1209", "Assault", Some("12.09")),
    ("b_1210", "Exposure to force of nature", Some("12.10")),
    ("b_1299", "Other and unspecified external CoD", Some("12.99")),
    ("b_9800", "Other and unspecified NCD", Some("98")),
    ("c_cult", "Culture", None),
    ("c_emer", "Emergency", None),
    ("c_hsys", "Health systems", None),
    ("c_inev", "Inevitable", None),
    ("c_know", "Knowledge", None),
    ("c_resr", "Resources", None),
];

/// Lowercase standard cause code to its position in [`STANDARD_CAUSES`].
fn standard_code_index() -> AHashMap<String, usize> {
    let mut by_code = AHashMap::with_capacity(STANDARD_CAUSES.len());
    for (idx, (code, _, _)) in STANDARD_CAUSES.iter().enumerate() {
        by_code.insert(code.to_ascii_lowercase(), idx);
    }
    by_code
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CauseEntry {
    code: String,
    name: String,
    group: Option<String>,
}

/// Index-to-name mapping for the cause columns of one probability base.
#[derive(Debug, Clone)]
pub struct CauseCatalog {
    entries: Vec<CauseEntry>,
    standard: bool,
}

impl CauseCatalog {
    /// The reference InterVA5 catalogue.
    pub fn standard() -> Self {
        let entries = STANDARD_CAUSES
            .iter()
            .map(|&(code, name, group)| CauseEntry {
                code: code.to_string(),
                name: name.to_string(),
                group: group.map(str::to_string),
            })
            .collect();
        Self::from_entries(entries, true)
    }

    /// Builds the catalogue from the cause column headers of a probability base.
    ///
    /// Headers that are recognised cause codes (case-insensitive) take the reference
    /// display name and group code. Anything else is a non-standard base, and the
    /// header text itself becomes the display name.
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Self {
        let standard = headers.len() == CAUSE_COUNT
            && headers
                .iter()
                .zip(STANDARD_CAUSES.iter())
                .all(|(header, (code, _, _))| header.as_ref().trim().eq_ignore_ascii_case(code));
        if standard {
            return Self::standard();
        }

        let by_code = standard_code_index();
        let entries = headers
            .iter()
            .map(|header| {
                let header = header.as_ref().trim();
                match by_code.get(&header.to_ascii_lowercase()) {
                    Some(&idx) => {
                        let (code, name, group) = STANDARD_CAUSES[idx];
                        CauseEntry {
                            code: code.to_string(),
                            name: name.to_string(),
                            group: group.map(str::to_string),
                        }
                    }
                    None => CauseEntry {
                        code: header.to_string(),
                        name: header.to_string(),
                        group: None,
                    },
                }
            })
            .collect();
        Self::from_entries(entries, false)
    }

    fn from_entries(entries: Vec<CauseEntry>, standard: bool) -> Self {
        Self { entries, standard }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when the columns are exactly the reference InterVA5 causes, in order.
    pub fn is_standard(&self) -> bool {
        self.standard
    }

    pub fn name(&self, cause: CauseIndex) -> &str {
        &self.entries[cause.0].name
    }

    pub fn code(&self, cause: CauseIndex) -> &str {
        &self.entries[cause.0].code
    }

    pub fn group_code(&self, cause: CauseIndex) -> Option<&str> {
        self.entries[cause.0].group.as_deref()
    }

    /// The label written to reports. With `groupcode`, medical causes are prefixed by
    /// their group code (e.g. `01.05 Malaria`); other blocks are never prefixed.
    pub fn label(&self, cause: CauseIndex, groupcode: bool) -> String {
        match self.group_code(cause) {
            Some(group) if groupcode && Block::Medical.contains(cause.0) => {
                format!("{group} {}", self.name(cause))
            }
            _ => self.name(cause).to_string(),
        }
    }
}
