//! Weak reference resolution
//!
//! Runs at the end of the prepare step, after every promotion, since only
//! then is it known which private objects survive. Every root copy and
//! every twin whose type has a weak field gets that field rewritten:
//!
//! | target                     | becomes              |
//! |----------------------------|----------------------|
//! | null                       | null                 |
//! | a root's private copy      | the root's address   |
//! | a promoted private object  | its twin             |
//! | a private object left over | null                 |
//! | a shared object            | unchanged            |

use crate::commit::Committer;
use crate::error::{Result, StmError};
use crate::object::{Address, Version};

impl Committer<'_> {
    pub(crate) fn resolve_weak_refs(&mut self) -> Result<()> {
        let holders = std::mem::take(&mut self.weak_holders);

        for holder in holders {
            let type_id = self.header_of(holder)?.type_id();
            let Some(offset) = self.layout.weak_field_offset(type_id) else {
                continue;
            };

            let value = self.read_field(holder, offset)?;
            let resolved = self.resolve_weak(value)?;
            if resolved != value {
                self.write_field(holder, offset, resolved)?;
            }
        }
        Ok(())
    }

    fn resolve_weak(&mut self, value: usize) -> Result<usize> {
        let Some(target) = Address::new(value) else {
            return Ok(0);
        };

        if let Some(&shared) = self.root_of.get(&target) {
            self.report.weak_redirected += 1;
            return Ok(shared.as_usize());
        }

        if self.tx.nursery.contains(target) {
            return match self.tx.nursery.header(target)?.version() {
                Version::Forwarded(twin) => {
                    self.report.weak_redirected += 1;
                    Ok(twin.as_usize())
                }
                Version::Empty => {
                    self.report.weak_cleared += 1;
                    log::trace!("thread {}: weak target {} cleared", self.thread, target);
                    Ok(0)
                }
                Version::Original(shared) => Err(StmError::MissingPrivateCopy {
                    shared,
                    private: target,
                }),
            };
        }

        if self.shared.contains(target) {
            return Ok(value);
        }

        Err(StmError::ForeignAddress {
            address: target,
            thread: self.thread.0,
        })
    }
}
