//! Static applet catalog

use crate::models::{Applet, Category, Currency};

/// Share of each invocation fee retained by the platform
pub const PLATFORM_FEE_PERCENTAGE: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct Catalog {
    applets: Vec<Applet>,
}

impl Catalog {
    pub fn new(applets: Vec<Applet>) -> Self {
        Self { applets }
    }

    /// The four launch applets
    pub fn seeded() -> Self {
        Self::new(vec![
            Applet {
                id: "app-001".to_string(),
                name: "Bond Issuance Integrity".to_string(),
                description: "Verifies the cryptographic integrity and regulatory compliance of new government bond issuances.".to_string(),
                version: "1.0.2".to_string(),
                creator: "0xGovBond...4a2b".to_string(),
                invocation_fee: 0.05,
                currency: Currency::Celo,
                category: Category::Issuance,
                metadata_hash: "QmXoyp...7V13".to_string(),
            },
            Applet {
                id: "app-002".to_string(),
                name: "Asset Provenance Tracker".to_string(),
                description: "Ensures underlying real-world assets are properly titled and haven't been double-pledged.".to_string(),
                version: "2.1.0".to_string(),
                creator: "0xAssetReg...8f91".to_string(),
                invocation_fee: 1.00,
                currency: Currency::Cusd,
                category: Category::Provenance,
                metadata_hash: "QmYvWz...1k56".to_string(),
            },
            Applet {
                id: "app-003".to_string(),
                name: "Ownership Identity Verifier".to_string(),
                description: "Confirms that the bond holder identity matches the KYC/AML records on the registry.".to_string(),
                version: "0.9.5".to_string(),
                creator: "0xIdentity...2e12".to_string(),
                invocation_fee: 0.15,
                currency: Currency::Celo,
                category: Category::Ownership,
                metadata_hash: "QmZwRt...9u87".to_string(),
            },
            Applet {
                id: "app-004".to_string(),
                name: "Regulatory Compliance Audit".to_string(),
                description: "Aggregates multiple verification steps into a single immutable audit trail for SEC/ESMA compliance.".to_string(),
                version: "3.0.0".to_string(),
                creator: "0xRegulator...cc04".to_string(),
                invocation_fee: 5.00,
                currency: Currency::Ceur,
                category: Category::Compliance,
                metadata_hash: "QmAbCd...3v21".to_string(),
            },
        ])
    }

    pub fn all(&self) -> &[Applet] {
        &self.applets
    }

    pub fn len(&self) -> usize {
        self.applets.len()
    }

    pub fn get(&self, id: &str) -> Option<&Applet> {
        self.applets.iter().find(|a| a.id == id)
    }

    /// Case-insensitive substring match over name and description, optionally
    /// narrowed to one category. Catalog order is preserved.
    pub fn search(&self, query: &str, category: Option<Category>) -> Vec<&Applet> {
        let needle = query.to_lowercase();
        self.applets
            .iter()
            .filter(|a| {
                a.name.to_lowercase().contains(&needle)
                    || a.description.to_lowercase().contains(&needle)
            })
            .filter(|a| category.map_or(true, |c| a.category == c))
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::seeded()
    }
}
