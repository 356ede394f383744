//! Client certificate material for mutual TLS.

use std::fs;
use std::io::BufReader;

use color_eyre::{
    eyre::{bail, WrapErr},
    Report,
};
use reqwest::{Certificate, ClientBuilder, Identity};

use crate::config::ClientTls;

pub(crate) struct ClientMaterial {
    identity: Identity,
    roots: Vec<Certificate>,
}

impl ClientMaterial {
    /// The key may be PKCS#8, PKCS#1 (`RSA PRIVATE KEY`) or SEC1 (`EC PRIVATE KEY`).
    pub(crate) fn load(tls: &ClientTls) -> Result<Self, Report> {
        let mut pem = fs::read(&tls.cert)
            .wrap_err_with(|| format!("could not load certificate({})", tls.cert.display()))?;
        let key = fs::read(&tls.key)
            .wrap_err_with(|| format!("could not load key({})", tls.key.display()))?;
        pem.push(b'\n');
        pem.extend_from_slice(&key);
        let identity = Identity::from_pem(&pem).wrap_err_with(|| {
            format!(
                "could not use certificate({}) with key({})",
                tls.cert.display(),
                tls.key.display()
            )
        })?;

        let bundle = fs::read(&tls.cacert)
            .wrap_err_with(|| format!("could not load CA({})", tls.cacert.display()))?;
        let roots = rustls_pemfile::certs(&mut BufReader::new(bundle.as_slice()))
            .wrap_err_with(|| format!("invalid PEM in CA({})", tls.cacert.display()))?
            .iter()
            .map(|der| Certificate::from_der(der))
            .collect::<Result<Vec<_>, _>>()
            .wrap_err_with(|| format!("invalid certificate in CA({})", tls.cacert.display()))?;
        if roots.is_empty() {
            bail!("no certificates found in CA({})", tls.cacert.display());
        }

        Ok(Self { identity, roots })
    }

    /// Present the client identity and trust only the loaded CA bundle.
    pub(crate) fn apply(self, builder: ClientBuilder) -> ClientBuilder {
        self.roots.into_iter().fold(
            builder
                .identity(self.identity)
                .tls_built_in_root_certs(false),
            |builder, root| builder.add_root_certificate(root),
        )
    }
}
