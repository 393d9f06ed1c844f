//! Multilingual contact-page vocabulary.

use once_cell::sync::Lazy;
use regex::RegexSet;
use std::collections::HashSet;

/// Contact-page keywords per language (ISO 639-1 code, keywords). All lowercase.
pub static CONTACT_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "contact", "about", "about us", "about-us", "team", "imprint", "impressum", "legal",
            "privacy", "get in touch", "reach us", "connect", "support",
        ],
    ),
    (
        "de",
        &[
            "kontakt", "über uns", "ueber uns", "impressum", "team", "datenschutz",
            "ansprechpartner", "schreiben sie uns", "kontaktformular", "kontaktieren",
        ],
    ),
    (
        "fr",
        &[
            "contact", "à propos", "a propos", "équipe", "equipe", "mentions légales",
            "mentions legales", "nous contacter", "contactez-nous", "coordonnées", "coordonnees",
            "nous écrire", "nous ecrire",
        ],
    ),
    (
        "es",
        &[
            "contacto", "acerca", "sobre nosotros", "equipo", "aviso legal", "contáctanos",
            "contactanos", "quiénes somos", "quienes somos", "información legal",
            "informacion legal",
        ],
    ),
    (
        "it",
        &[
            "contatto", "contatti", "chi siamo", "team", "note legali", "informazioni legali",
            "scrivici", "dove siamo", "nostro team",
        ],
    ),
    (
        "nl",
        &[
            "contact", "over ons", "team", "juridisch", "neem contact op", "contactgegevens",
            "contactformulier", "over", "wie zijn wij", "ons team",
        ],
    ),
    (
        "pl",
        &[
            "kontakt", "o nas", "zespół", "zespol", "informacje prawne", "dane kontaktowe",
            "napisz do nas", "skontaktuj się", "skontaktuj sie",
        ],
    ),
    (
        "sv",
        &[
            "kontakt", "om oss", "team", "juridisk information", "kontakta oss", "vårt team",
            "vart team", "kontaktuppgifter", "hör av dig", "hor av dig",
        ],
    ),
    (
        "da",
        &[
            "kontakt", "om os", "team", "juridisk information", "kontakt os", "vores team",
            "skriv til os", "kontaktoplysninger",
        ],
    ),
    (
        "fi",
        &[
            "yhteystiedot", "meistä", "meista", "tiimi", "oikeudelliset tiedot", "ota yhteyttä",
            "ota yhteytta", "yhteydenotto", "tietoa meistä", "tietoa meista",
        ],
    ),
    (
        "el",
        &[
            "επικοινωνία", "επικοινωνια", "σχετικά με", "σχετικα με", "ομάδα", "ομαδα",
            "νομικές πληροφορίες", "νομικες πληροφοριες", "επικοινωνήστε μαζί μας",
            "επικοινωνηστε μαζι μας",
        ],
    ),
    (
        "pt",
        &[
            "contato", "contacto", "sobre nós", "sobre nos", "equipe", "equipa",
            "informações legais", "informacoes legais", "fale connosco", "fale conosco",
            "quem somos", "contactar", "contatar",
        ],
    ),
    (
        "cs",
        &[
            "kontakt", "o nás", "o nas", "tým", "tym", "právní informace", "pravni informace",
            "napište nám", "napiste nam", "kontaktní údaje", "kontaktni udaje",
        ],
    ),
    (
        "hu",
        &[
            "kapcsolat", "rólunk", "rolunk", "csapat", "jogi információk", "jogi informaciok",
            "kapcsolatfelvétel", "kapcsolatfelvetel", "írjon nekünk", "irjon nekunk",
            "elérhetőségek", "elerhetosegek",
        ],
    ),
    (
        "ro",
        &[
            "contact", "despre noi", "echipă", "echipa", "informații legale",
            "informatii legale", "contactați-ne", "contactati-ne", "scrieți-ne", "scrieti-ne",
            "date de contact",
        ],
    ),
    (
        "bg",
        &[
            "контакт", "контакти", "за нас", "екип", "правна информация",
            "свържете се с нас", "връзка с нас", "пишете ни",
        ],
    ),
    (
        "hr",
        &[
            "kontakt", "o nama", "tim", "pravne informacije", "kontaktirajte nas", "pišite nam",
            "pisite nam", "kontakt podaci",
        ],
    ),
    (
        "et",
        &[
            "kontakt", "meist", "meeskond", "õiguslik teave", "oiguslik teave", "teave",
            "võta ühendust", "vota uhendust", "kirjuta meile", "kontaktandmed",
        ],
    ),
    (
        "lv",
        &[
            "kontakti", "par mums", "komanda", "juridiskā informācija", "juridiska informacija",
            "sazinies ar mums", "raksti mums", "kontaktinformācija", "kontaktinformacija",
        ],
    ),
    (
        "lt",
        &[
            "kontaktai", "apie mus", "komanda", "teisinė informacija", "teisine informacija",
            "susisiekite", "susisiekite su mumis", "rašykite mums", "rasykite mums",
            "kontaktinė informacija", "kontaktine informacija",
        ],
    ),
    (
        "sl",
        &[
            "kontakt", "o nas", "ekipa", "pravne informacije", "kontaktirajte nas", "pišite nam",
            "pisite nam", "kontaktni podatki",
        ],
    ),
    (
        "sk",
        &[
            "kontakt", "o nás", "o nas", "tím", "tim", "právne informácie", "pravne informacie",
            "napíšte nám", "napiste nam", "kontaktné údaje", "kontaktne udaje",
        ],
    ),
    (
        "mt",
        &[
            "kuntatt", "dwar", "tim", "informazzjoni legali", "ikkuntattjana", "ikteb lilna",
            "dettalji ta' kuntatt", "dettalji ta kuntatt",
        ],
    ),
    (
        "ga",
        &[
            "teagmháil", "teagmhail", "fúinn", "fuinn", "foireann", "eolas dlíthiúil",
            "eolas dlithiuil", "déan teagmháil linn", "dean teagmhail linn", "scríobh chugainn",
            "scriobh chugainn",
        ],
    ),
    (
        "lb",
        &[
            "kontakt", "iwwer eis", "equipe", "rechtlech informatiounen", "kontaktéiert eis",
            "kontakteiert eis", "schreift eis",
        ],
    ),
    (
        "ca",
        &[
            "contacte", "sobre nosaltres", "equip", "informació legal", "informacio legal",
            "contacta'ns", "contactans", "escriu-nos", "escriu nos",
        ],
    ),
    (
        "eu",
        &[
            "kontaktua", "guri buruz", "taldea", "lege informazioa", "jar zaitez harremanetan",
            "idatzi guri",
        ],
    ),
    (
        "gl",
        &[
            "contacto", "sobre nós", "sobre nos", "equipo", "información legal",
            "informacion legal", "contacta connosco", "escríbenos", "escribenos",
        ],
    ),
    (
        "cy",
        &[
            "cysylltu", "amdanom ni", "tîm", "tim", "gwybodaeth gyfreithiol", "cysylltwch â ni",
            "cysylltwch a ni", "ysgrifennwch atom",
        ],
    ),
    (
        "gd",
        &[
            "fios thugainn", "mu ar deidhinn", "sgioba", "fiosrachadh laghail",
            "cuir fios thugainn", "sgrìobh thugainn", "sgriobh thugainn",
        ],
    ),
];

/// Union of every language's keywords, deduplicated, in table order.
pub static ALL_CONTACT_KEYWORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut seen = HashSet::new();
    CONTACT_KEYWORDS
        .iter()
        .flat_map(|(_, keywords)| keywords.iter().copied())
        .filter(|keyword| seen.insert(*keyword))
        .collect()
});

/// Typical contact/about page paths across languages.
const CONTACT_PATH_PATTERNS: &[&str] = &[
    "/contact", "/kontakt", "/contacto", "/contatti", "/contact-us", "/about", "/about-us",
    "/ueber-uns", "/impressum", "/imprint", "/get-in-touch", "/reach-us", "/reach-out",
    "/connect", "/teave", "/yhteystiedot", "/kontakti", "/kontaktai", "/kapcsolat",
    "/επικοινωνία", "/επικοινωνια", "/контакт", "/контакти", "/teagmháil", "/teagmhail",
    "/kuntatt", "/cysylltu", "/fios-thugainn", "/o-nas", "/o-nás", "/o-nama", "/par-mums",
    "/apie-mus", "/despre-noi", "/rólunk", "/rolunk", "/meistä", "/meista", "/om-oss", "/om-os",
    "/über-uns", "/chi-siamo", "/quienes-somos", "/wie-zijn-wij", "/guri-buruz",
    "/amdanom-ni", "/mu-ar-deidhinn", "/iwwer-eis", "/sobre-nosaltres", "/sobre-nós",
    "/sobre-nos",
];

pub static CONTACT_PATH_SET: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new(CONTACT_PATH_PATTERNS.iter().map(|p| regex::escape(p)))
        .expect("Failed to compile CONTACT_PATH_SET")
});

/// True when `word` is one of the contact keywords.
pub fn is_contact_keyword(word: &str) -> bool {
    ALL_CONTACT_KEYWORDS.iter().any(|k| *k == word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_tables_cover_thirty_languages() {
        assert_eq!(CONTACT_KEYWORDS.len(), 30);
        let mut codes: Vec<_> = CONTACT_KEYWORDS.iter().map(|(code, _)| *code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 30);
    }

    #[test]
    fn test_union_is_deduplicated_and_lowercase() {
        let unique: HashSet<_> = ALL_CONTACT_KEYWORDS.iter().collect();
        assert_eq!(unique.len(), ALL_CONTACT_KEYWORDS.len());
        assert!(ALL_CONTACT_KEYWORDS.iter().all(|k| k.to_lowercase() == *k));
        assert!(is_contact_keyword("kontakt"));
        assert!(is_contact_keyword("επικοινωνία"));
        assert!(!is_contact_keyword("pricing"));
    }

    #[test]
    fn test_contact_path_set() {
        assert!(CONTACT_PATH_SET.is_match("https://acme.test/kontakt"));
        assert!(CONTACT_PATH_SET.is_match("https://acme.test/fr/chi-siamo"));
        assert!(!CONTACT_PATH_SET.is_match("https://acme.test/pricing"));
    }
}
