use crate::comm::Communicator;
use crate::matmult::MatmultParameters;

/// Communicator and parameters shared by the products of one rank.
/// Hands out exchange tags in call order, so ranks that create products
/// in the same order agree on every tag.
pub struct MatmultContext<C: Communicator> {
    comm: C,
    params: MatmultParameters,
    next_tag: u64,
}

impl<C: Communicator> MatmultContext<C> {
    pub fn new(comm: C) -> Self {
        Self::with_parameters(comm, MatmultParameters::default())
    }

    pub fn with_parameters(comm: C, params: MatmultParameters) -> Self {
        MatmultContext {
            comm,
            next_tag: params.first_tag,
            params,
        }
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn comm_mut(&mut self) -> &mut C {
        &mut self.comm
    }

    pub fn parameters(&self) -> &MatmultParameters {
        &self.params
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub(crate) fn next_tag(&mut self) -> u64 {
        let tag = self.next_tag;
        self.next_tag += 1;
        tag
    }

    pub fn into_comm(self) -> C {
        self.comm
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::comm::SelfComm;

    #[test]
    fn tags_advance() {
        let mut ctx = MatmultContext::new(SelfComm::new());
        let first = ctx.next_tag();
        assert_eq!(first, MatmultParameters::default().first_tag);
        assert_eq!(ctx.next_tag(), first + 1);
        assert_eq!(ctx.rank(), 0);
    }
}
