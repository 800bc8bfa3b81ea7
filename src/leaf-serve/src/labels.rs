use crate::{Error, Result};

/// Species the bundled leaf model was trained on, in output order.
pub const LEAF_SPECIES: [&str; 85] = [
    "Aloevera",
    "Amar poi",
    "Amla",
    "Amruta_Balli",
    "Arali",
    "Ashoka",
    "Ashwagandha",
    "Astma_weed",
    "Avacado",
    "Badipala",
    "Balloon_Vine",
    "Bamboo",
    "Basale",
    "Beans",
    "Betel",
    "Betel_Nut",
    "Bhrami",
    "Bringaraja",
    "Caricature",
    "Castor",
    "Catharanthus",
    "Chakte",
    "Chilly",
    "Citron lime (herelikai)",
    "Coffee",
    "Common rue",
    "Coriender",
    "Curry_Leaf",
    "Doddapatre",
    "Drumstick",
    "Ekka",
    "Eucalyptus",
    "Ganike",
    "Gasagase",
    "Geranium",
    "Ginger",
    "Globe Amarnath",
    "Guava",
    "Henna",
    "Hibiscus",
    "Honge",
    "Insulin",
    "Jackfruit",
    "Jasmine",
    "Kasambruga",
    "Kohlrabi",
    "Lantana",
    "Lemon",
    "Lemon_grass",
    "Malabar_Nut",
    "Mango",
    "Marigold",
    "Mint",
    "Nagadali",
    "Neem",
    "Nelavembu",
    "Nerale",
    "Nooni",
    "Onion",
    "Padri",
    "Palak(Spinach)",
    "Papaya",
    "Parijatha",
    "Pea",
    "Pepper",
    "Pomegranate",
    "Pumpkin",
    "Raddish",
    "Raktachandini",
    "Rose",
    "Sampige",
    "Sapota",
    "Seethaashoka",
    "Seethapala",
    "Tamarind",
    "Taro",
    "Tecoma",
    "Thumbe",
    "Tomato",
    "Tulsi",
    "Turmeric",
    "Wood_sorel",
    "camphor",
    "kamakasturi",
    "kepala",
];

/// Ordered mapping from model output index to species name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelCatalog {
    labels: Vec<String>,
}

impl LabelCatalog {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LabelCatalog {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&str> {
        self.labels
            .get(index)
            .map(String::as_str)
            .ok_or(Error::LabelOutOfRange {
                index,
                len: self.labels.len(),
            })
    }

    /// Check the catalog against the model's declared output dimension.
    pub fn check_outputs(&self, outputs: usize) -> Result<()> {
        if outputs != self.labels.len() {
            return Err(Error::CatalogMismatch {
                labels: self.labels.len(),
                outputs,
            });
        }

        Ok(())
    }
}

impl Default for LabelCatalog {
    fn default() -> Self {
        LabelCatalog::new(LEAF_SPECIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_keeps_training_order() {
        let catalog = LabelCatalog::default();

        assert_eq!(catalog.len(), 85);
        assert_eq!(catalog.get(0).unwrap(), "Aloevera");
        assert_eq!(catalog.get(32).unwrap(), "Ganike");
        assert_eq!(catalog.get(78).unwrap(), "Tomato");
        assert_eq!(catalog.get(84).unwrap(), "kepala");
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let catalog = LabelCatalog::new(["a", "b"]);

        assert!(matches!(
            catalog.get(2),
            Err(Error::LabelOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn output_dimension_must_match() {
        let catalog = LabelCatalog::default();

        assert!(catalog.check_outputs(85).is_ok());
        assert!(matches!(
            catalog.check_outputs(80),
            Err(Error::CatalogMismatch {
                labels: 85,
                outputs: 80
            })
        ));
    }
}
