use crate::resource::ResourceRef;

/// Asociación resuelta (origen, destino) de una transferencia. La operación
/// y la correspondencia de columnas se fijan al planificar y quedan en el
/// `TransferListener` del par.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPair {
    pub source: ResourceRef,
    pub target: ResourceRef,
}

impl TransferPair {
    pub fn new(source: ResourceRef, target: ResourceRef) -> Self { Self { source, target } }

    pub fn source_uri(&self) -> String { self.source.uri() }

    pub fn target_uri(&self) -> String { self.target.uri() }
}
