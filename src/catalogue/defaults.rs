//! Default catalogue lists, VizieR table names and columns.

use crate::{epoch::Epoch, services::CatalogueSource};

use super::CatalogueSpec;

/// Proper-motion catalogues searched to seed the position record, in priority order.
pub fn proper_motion_catalogues() -> Vec<CatalogueSource> {
    vec![
        CatalogueSource::new("I/345/gaia2", "RA_ICRS", "DE_ICRS", 2015.5)
            .with_proper_motion("pmRA", "pmDE")
            .with_columns(&["Source", "Gmag"]),
        CatalogueSource::new("I/311/hip2", "RArad", "DErad", 1991.25)
            .with_proper_motion("pmRA", "pmDE")
            .with_columns(&["HIP"]),
        // mean positions (RAmdeg) are not epoch 1991.25; the observed ICRS ones are
        CatalogueSource::new("I/259/tyc2", "RA_ICRS_", "DE_ICRS_", 1991.25)
            .with_proper_motion("pmRA", "pmDE")
            .with_columns(&["TYC1", "TYC2", "TYC3"]),
        CatalogueSource::new("I/322A/out", "RAJ2000", "DEJ2000", 2000.0)
            .with_proper_motion("pmRA", "pmDE")
            .with_columns(&["UCAC4"]),
    ]
}

/// Photometric catalogues, by increasing wavelength.
pub fn photometry_catalogues() -> Vec<CatalogueSpec> {
    vec![
        CatalogueSpec::cone(
            "tyc2",
            "Tycho-2",
            Epoch::J1991_25,
            0.42,
            CatalogueSource::new("I/259/tyc2", "RA_ICRS_", "DE_ICRS_", 1991.25),
            2.0,
        )
        .with_fields(&["TYC1", "TYC2", "TYC3", "BTmag", "e_BTmag", "VTmag", "e_VTmag"]),
        CatalogueSpec::cone(
            "hip_main",
            "Hipparcos",
            Epoch::J1991_25,
            0.52,
            CatalogueSource::new("I/311/hip2", "RArad", "DErad", 1991.25),
            2.0,
        )
        .with_fields(&["HIP", "Hpmag", "e_Hpmag", "B-V", "e_B-V", "Plx", "e_Plx"]),
        CatalogueSpec::cone(
            "apass",
            "APASS DR9",
            Epoch::J2000,
            0.55,
            CatalogueSource::new("II/336/apass9", "RAJ2000", "DEJ2000", 2000.0),
            2.0,
        )
        .with_fields(&["Bmag", "e_Bmag", "Vmag", "e_Vmag", "g'mag", "e_g'mag", "r'mag", "e_r'mag", "i'mag", "e_i'mag"]),
        CatalogueSpec::cone(
            "denis",
            "DENIS",
            Epoch::J2000,
            0.79,
            CatalogueSource::new("B/denis/denis", "RAJ2000", "DEJ2000", 2000.0),
            2.0,
        )
        .with_fields(&["DENIS", "Imag", "e_Imag", "Jmag", "e_Jmag", "Kmag", "e_Kmag"]),
        CatalogueSpec::cone(
            "tmass",
            "2MASS",
            Epoch::J1999_3,
            1.25,
            CatalogueSource::new("II/246/out", "RAJ2000", "DEJ2000", 1999.3),
            2.0,
        )
        .with_fields(&["2MASS", "Jmag", "e_Jmag", "Hmag", "e_Hmag", "Kmag", "e_Kmag", "Qflg"]),
        CatalogueSpec::cone(
            "allwise",
            "AllWISE",
            Epoch::J2010_3,
            3.4,
            CatalogueSource::new("II/328/allwise", "RAJ2000", "DEJ2000", 2010.3),
            2.0,
        )
        .with_fields(&["AllWISE", "W1mag", "e_W1mag", "W2mag", "e_W2mag", "W3mag", "e_W3mag", "W4mag", "e_W4mag", "ccf"]),
        CatalogueSpec::cone(
            "akari_irc",
            "AKARI IRC",
            Epoch::J2007_0,
            9.0,
            CatalogueSource::new("II/297/irc", "RAJ2000", "DEJ2000", 2007.0),
            3.0,
        )
        .with_fields(&["objID", "S09", "e_S09", "q_S09", "S18", "e_S18", "q_S18"]),
        CatalogueSpec::cone(
            "seip",
            "Spitzer SEIP",
            Epoch::J2000,
            24.0,
            CatalogueSource::new("II/368/sstsl2", "RAJ2000", "DEJ2000", 2000.0),
            3.0,
        )
        .with_fields(&["Name", "F3.6", "e_F3.6", "F4.5", "e_F4.5", "F5.8", "e_F5.8", "F8.0", "e_F8.0", "F24", "e_F24"]),
        CatalogueSpec::cone(
            "akari_fis",
            "AKARI FIS",
            Epoch::J2007_0,
            90.0,
            CatalogueSource::new("II/298/fis", "RAJ2000", "DEJ2000", 2007.0),
            10.0,
        )
        .with_fields(&["objID", "S65", "e_S65", "S90", "e_S90", "S140", "e_S140", "S160", "e_S160"]),
    ]
}
