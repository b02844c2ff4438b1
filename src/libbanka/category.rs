use crate::libbanka::model::Question;
use crate::libbanka::normalize::lowercase_tr;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    FirstAid,
    VehicleTechnique,
    TrafficSigns,
    TrafficEtiquette,
    TrafficAndEnvironment,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::FirstAid,
        Category::VehicleTechnique,
        Category::TrafficSigns,
        Category::TrafficEtiquette,
        Category::TrafficAndEnvironment,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::FirstAid => "İlk Yardım",
            Category::VehicleTechnique => "Motor ve Araç Tekniği",
            Category::TrafficSigns => "Trafik İşaretleri",
            Category::TrafficEtiquette => "Trafik Adabı",
            Category::TrafficAndEnvironment => "Trafik ve Çevre Bilgisi",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const FIRST_AID: &[&str] = &[
    "ilk yardım", "kazazede", "yaralı", "kanama", "kırık", "yanık",
    "şok", "bilinç", "solunum", "nabız", "kalp", "turnike", "sargı",
    "112", "ambulans", "hastane", "tedavi", "hayat kurtarma", "boğulma",
    "zehirlenme", "sara", "epilepsi", "bayılma", "suni solunum", "kalp masajı",
    "abc", "yaşam zinciri", "travma", "omurga", "boyun", "koma",
    "göğüs ağrısı", "nefes darlığı", "alerjik", "anafilaksi",
];

const VEHICLE_TECHNIQUE: &[&str] = &[
    "motor", "fren", "lastik", "akü", "yağ", "yakıt", "benzin", "dizel",
    "debriyaj", "vites", "şanzıman", "süspansiyon", "amortisör", "direksiyon",
    "far", "lambası", "sinyal", "silecek", "ayna", "kaporta", "şasi",
    "egzoz", "katalitik", "turbo", "radyatör", "soğutma", "hararet",
    "marş", "şarj", "alternatör", "bujiler", "enjektör", "hidrolik",
    "abs", "esp", "airbag", "hava yastığı", "emniyet kemeri", "emniyet",
    "conta", "piston", "silindir", "subap", "krank", "kam mili",
    "diferansiyel", "şaft", "aks", "bijon", "jant", "teker",
    "cc", "beygir", "güç", "tork", "hız", "devir",
];

const TRAFFIC_SIGNS: &[&str] = &[
    "işaret", "levha", "şekil", "tabela", "ışık", "sinyal",
    "kırmızı", "yeşil", "sarı", "yanıp", "dur", "dikkat", "uyarı",
    "yasak", "mecburi", "bilgi", "yön", "ok", "şerit", "geçiş",
    "yaya", "okul", "hastane", "kavşak", "dönüş", "viraj",
    "eğim", "tümsek", "çukur", "kaygan", "buzlanma", "taş düşebilir",
];

const TRAFFIC_ETIQUETTE: &[&str] = &[
    "saygı", "hoşgörü", "sabır", "nezaket", "adab", "davranış",
    "stres", "öfke", "agresif", "sakin", "dikkatli", "dikkatsiz",
    "alkol", "uyuşturucu", "ilaç", "yorgunluk", "uyku", "uykusuzluk",
    "dikkat dağınıklığı", "telefon", "cep telefonu", "mesaj",
    "empati", "anlayış", "paylaşım", "yol verme", "geçiş hakkı",
    "öncelik", "makas", "korna", "kornaya", "selektör",
];

/// Checked in this order; the first list with a hit decides.
const RULES: [(Category, &[&str]); 4] = [
    (Category::FirstAid, FIRST_AID),
    (Category::VehicleTechnique, VEHICLE_TECHNIQUE),
    (Category::TrafficSigns, TRAFFIC_SIGNS),
    (Category::TrafficEtiquette, TRAFFIC_ETIQUETTE),
];

pub fn classify(question_text: &str, options_text: &str) -> Category {
    let text = lowercase_tr(&format!("{question_text} {options_text}"));
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| text.contains(keyword)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::TrafficAndEnvironment)
}

/// Sets `category` on every question and returns how many landed in each.
pub fn categorize(questions: &mut [Question]) -> BTreeMap<Category, usize> {
    let mut counts: BTreeMap<Category, usize> =
        Category::ALL.iter().map(|category| (*category, 0)).collect();
    for question in questions.iter_mut() {
        let category = classify(question.text(), &question.options_text());
        debug!("[Category] #{} -> {}", question.id, category);
        question.category = Some(Some(category.label().to_string()));
        *counts.entry(category).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libbanka::model::fixtures::question;
    use serde_json::json;

    #[test]
    fn earlier_lists_take_priority() {
        // "alkol" is etiquette, "fren" is vehicle technique
        assert_eq!(
            classify("Alkollü sürücü fren yapamadı", ""),
            Category::VehicleTechnique
        );
        assert_eq!(
            classify("Kazazedeye motor yağı bulaşırsa ne yapılır?", ""),
            Category::FirstAid
        );
    }

    #[test]
    fn falls_back_to_environment() {
        assert_eq!(
            classify("Trafik kazalarının en önemli sebebi nedir?", ""),
            Category::TrafficAndEnvironment
        );
    }

    #[test]
    fn options_text_counts() {
        assert_eq!(classify("Sürücü nasıl olmalıdır?", "Sabırlı"), Category::TrafficEtiquette);
    }

    #[test]
    fn uppercase_turkish_text_matches() {
        assert_eq!(classify("İLK YARDIMDA ÖNCELİK NEDİR?", ""), Category::FirstAid);
    }

    #[test]
    fn categorize_labels_every_question() {
        let mut questions = vec![
            question(json!({ "id": 1, "questionText": "Kanama nasıl durdurulur?" })),
            question(json!({ "id": 2, "questionText": "Hangisi doğrudur?",
                             "options": { "A": "Lastik", "B": { "text": "Jant", "imageUrl": null } } })),
            question(json!({ "id": 3, "questionText": "Karayolu nedir?", "category": null })),
        ];
        let counts = categorize(&mut questions);

        assert_eq!(questions[0].category(), Some("İlk Yardım"));
        assert_eq!(questions[1].category(), Some("Motor ve Araç Tekniği"));
        assert_eq!(questions[2].category(), Some("Trafik ve Çevre Bilgisi"));
        assert_eq!(counts[&Category::TrafficSigns], 0);
        assert_eq!(counts.values().sum::<usize>(), 3);
    }
}
