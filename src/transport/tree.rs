//! # Completion Tree
//!
//! Binary-tree aggregation of completed-history counts. Counts flow up
//! the tree as ranks finish work; the root declares global termination
//! when its accumulated count reaches the global history total, then the
//! total flows back down so every rank can stop.
//!
//! The count sent up the tree is cumulative and is reset after each send,
//! so completions are never double counted and no synchronization between
//! siblings is needed. The root never resets its count.

use crate::buffer::Buffer;
use crate::comm::{CommError, RankComm};
use crate::transport::MessageCounter;

/// One rank's node of the completion tree
pub struct CompletionTree {
    parent: Option<usize>,
    child1: Option<usize>,
    child2: Option<usize>,
    n_global: u64,
    /// Completions accumulated for the next upward send
    tree_count: u64,
    /// Last value received from the parent (the broadcast total)
    parent_count: u64,
    /// Last values received from the children
    c1_count: u64,
    c2_count: u64,
    c1_recv: Buffer<u64>,
    c2_recv: Buffer<u64>,
    p_recv: Buffer<u64>,
    p_send: Buffer<u64>,
    c1_send: Buffer<u64>,
    c2_send: Buffer<u64>,
}

impl CompletionTree {
    /// Place this rank in the complete binary tree over `n_ranks`
    pub fn new(rank: usize, n_ranks: usize, n_global: u64) -> Self {
        let parent = if rank == 0 { None } else { Some((rank + 1) / 2 - 1) };
        let child1 = Some(2 * rank + 1).filter(|&c| c < n_ranks);
        let child2 = Some(2 * rank + 2).filter(|&c| c < n_ranks);
        Self {
            parent,
            child1,
            child2,
            n_global,
            tree_count: 0,
            parent_count: 0,
            c1_count: 0,
            c2_count: 0,
            c1_recv: Buffer::new(),
            c2_recv: Buffer::new(),
            p_recv: Buffer::new(),
            p_send: Buffer::new(),
            c1_send: Buffer::new(),
            c2_send: Buffer::new(),
        }
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> (Option<usize>, Option<usize>) {
        (self.child1, self.child2)
    }

    /// Count accumulated and not yet forwarded
    pub fn tree_count(&self) -> u64 {
        self.tree_count
    }

    /// Post the count receives from both children and the parent
    pub fn post_recvs(&mut self, ctr: &mut MessageCounter) {
        if self.child1.is_some() {
            self.c1_recv.set_awaiting();
            ctr.n_receives_posted += 1;
        }
        if self.child2.is_some() {
            self.c2_recv.set_awaiting();
            ctr.n_receives_posted += 1;
        }
        if self.parent.is_some() {
            self.p_recv.set_awaiting();
            ctr.n_receives_posted += 1;
        }
    }

    /// One round of tree messaging
    ///
    /// Child counts fold into `tree_count` and their receives re-post.
    /// The parent's value is recorded once and not re-posted; a single
    /// final broadcast is expected on that channel. Local completions in
    /// `n_complete` roll up and the count is sent to the parent when
    /// `local_drained` holds (source exhausted and receive stack empty,
    /// so the completions cannot spawn further passes) and no prior send
    /// is in flight.
    pub fn progress(
        &mut self,
        comm: &RankComm,
        ctr: &mut MessageCounter,
        n_complete: &mut u64,
        local_drained: bool,
    ) -> Result<(), CommError> {
        if let Some(c1) = self.child1 {
            if self.c1_recv.awaiting() {
                if let Some(count) = comm.try_recv_count(c1)? {
                    ctr.n_receives_completed += 1;
                    self.c1_recv.set_received(vec![count]);
                    self.c1_count = self.c1_recv.take()[0];
                    self.tree_count += self.c1_count;
                    self.c1_recv.set_awaiting();
                    ctr.n_receives_posted += 1;
                }
            }
        }
        if let Some(c2) = self.child2 {
            if self.c2_recv.awaiting() {
                if let Some(count) = comm.try_recv_count(c2)? {
                    ctr.n_receives_completed += 1;
                    self.c2_recv.set_received(vec![count]);
                    self.c2_count = self.c2_recv.take()[0];
                    self.tree_count += self.c2_count;
                    self.c2_recv.set_awaiting();
                    ctr.n_receives_posted += 1;
                }
            }
        }

        if let Some(p) = self.parent {
            if self.p_recv.awaiting() {
                if let Some(count) = comm.try_recv_count(p)? {
                    ctr.n_receives_completed += 1;
                    self.p_recv.set_received(vec![count]);
                    self.parent_count = self.p_recv.take()[0];
                }
            }
        }

        if self.p_send.sent() {
            self.p_send.reset();
            ctr.n_sends_completed += 1;
        }

        // roll local completions into the tree exactly once
        self.tree_count += *n_complete;
        *n_complete = 0;

        if let Some(p) = self.parent {
            if self.tree_count > 0 && self.p_send.empty() && local_drained {
                self.p_send.fill(vec![self.tree_count]);
                let payload = self.p_send.post_send();
                comm.send_count(p, payload[0])?;
                ctr.n_sends_posted += 1;
                self.tree_count = 0;
            }
        }
        Ok(())
    }

    /// Global termination as observed by this rank
    pub fn finished(&self) -> bool {
        self.tree_count == self.n_global || self.parent_count == self.n_global
    }

    /// Relay the global total down to the children
    ///
    /// The root initiates; interior ranks relay after leaving the work
    /// loop (which they only do once the total reached them). Also
    /// retires the final upward count send if it is still marked
    /// in flight.
    pub fn broadcast_down(
        &mut self,
        comm: &RankComm,
        ctr: &mut MessageCounter,
    ) -> Result<(), CommError> {
        if let Some(c1) = self.child1 {
            self.c1_send.fill(vec![self.n_global]);
            let payload = self.c1_send.post_send();
            comm.send_count(c1, payload[0])?;
            ctr.n_sends_posted += 1;
            self.c1_send.reset();
            ctr.n_sends_completed += 1;
        }
        if let Some(c2) = self.child2 {
            self.c2_send.fill(vec![self.n_global]);
            let payload = self.c2_send.post_send();
            comm.send_count(c2, payload[0])?;
            ctr.n_sends_posted += 1;
            self.c2_send.reset();
            ctr.n_sends_completed += 1;
        }
        if self.p_send.sent() {
            self.p_send.reset();
            ctr.n_sends_completed += 1;
        }
        Ok(())
    }

    /// Close the remaining count requests after the barrier
    ///
    /// The parent still holds a posted receive from this rank; a final
    /// one-element send satisfies it. Symmetrically, the receives this
    /// rank re-posted on its children complete on the children's final
    /// sends. Without this exchange those requests would leak.
    pub fn close_requests(
        &mut self,
        comm: &RankComm,
        ctr: &mut MessageCounter,
    ) -> Result<(), CommError> {
        if let Some(p) = self.parent {
            self.p_send.fill(vec![1]);
            let payload = self.p_send.post_send();
            comm.send_count(p, payload[0])?;
            ctr.n_sends_posted += 1;
            self.p_send.reset();
            ctr.n_sends_completed += 1;
        }
        if let Some(c1) = self.child1 {
            let count = comm.recv_count(c1)?;
            ctr.n_receives_completed += 1;
            self.c1_recv.set_received(vec![count]);
            let _ = self.c1_recv.take();
        }
        if let Some(c2) = self.child2 {
            let count = comm.recv_count(c2)?;
            ctr.n_receives_completed += 1;
            self.c2_recv.set_received(vec![count]);
            let _ = self.c2_recv.take();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::CommWorld;

    #[test]
    fn test_topology() {
        let t = CompletionTree::new(0, 7, 10);
        assert_eq!(t.parent(), None);
        assert_eq!(t.children(), (Some(1), Some(2)));

        let t = CompletionTree::new(2, 7, 10);
        assert_eq!(t.parent(), Some(0));
        assert_eq!(t.children(), (Some(5), Some(6)));

        let t = CompletionTree::new(3, 7, 10);
        assert_eq!(t.parent(), Some(1));
        assert_eq!(t.children(), (None, None));

        // a two-rank world has only the left child
        let t = CompletionTree::new(0, 2, 10);
        assert_eq!(t.children(), (Some(1), None));
    }

    #[test]
    fn test_rollup_is_exactly_once() {
        let mut world = CommWorld::new(1);
        let comm = world.pop().unwrap();
        let mut t = CompletionTree::new(0, 1, 5);
        let mut ctr = MessageCounter::default();
        t.post_recvs(&mut ctr);

        let mut n_complete = 3;
        t.progress(&comm, &mut ctr, &mut n_complete, true).unwrap();
        assert_eq!(n_complete, 0);
        assert_eq!(t.tree_count(), 3);
        t.progress(&comm, &mut ctr, &mut n_complete, true).unwrap();
        assert_eq!(t.tree_count(), 3);
        assert!(!t.finished());

        n_complete = 2;
        t.progress(&comm, &mut ctr, &mut n_complete, true).unwrap();
        assert!(t.finished());
    }

    #[test]
    fn test_child_count_folds_into_tree() {
        let mut world = CommWorld::new(2);
        let r1 = world.pop().unwrap();
        let r0 = world.pop().unwrap();
        let mut root = CompletionTree::new(0, 2, 4);
        let mut ctr = MessageCounter::default();
        root.post_recvs(&mut ctr);

        r1.send_count(0, 3).unwrap();
        let mut none = 0;
        root.progress(&r0, &mut ctr, &mut none, true).unwrap();
        assert_eq!(root.tree_count(), 3);
        assert!(!root.finished());

        r1.send_count(0, 1).unwrap();
        root.progress(&r0, &mut ctr, &mut none, true).unwrap();
        assert!(root.finished());
    }

    #[test]
    fn test_upward_send_gated_on_drained_rank() {
        let mut world = CommWorld::new(2);
        let r1 = world.pop().unwrap();
        let r0 = world.pop().unwrap();
        let mut leaf = CompletionTree::new(1, 2, 4);
        let mut ctr = MessageCounter::default();
        leaf.post_recvs(&mut ctr);

        let mut n_complete = 2;
        // not drained: completions roll up but stay put
        leaf.progress(&r1, &mut ctr, &mut n_complete, false).unwrap();
        assert_eq!(leaf.tree_count(), 2);
        assert!(r0.try_recv_count(1).unwrap().is_none());

        // drained: the count goes to the parent and resets
        leaf.progress(&r1, &mut ctr, &mut n_complete, true).unwrap();
        assert_eq!(leaf.tree_count(), 0);
        assert_eq!(r0.try_recv_count(1).unwrap(), Some(2));
    }

    #[test]
    fn test_parent_broadcast_terminates_leaf() {
        let mut world = CommWorld::new(2);
        let r1 = world.pop().unwrap();
        let r0 = world.pop().unwrap();
        let mut leaf = CompletionTree::new(1, 2, 4);
        let mut ctr = MessageCounter::default();
        leaf.post_recvs(&mut ctr);

        r0.send_count(1, 4).unwrap();
        let mut none = 0;
        leaf.progress(&r1, &mut ctr, &mut none, true).unwrap();
        assert!(leaf.finished());
    }

    #[test]
    fn test_two_rank_handshake_balances() {
        let world = CommWorld::new(2);
        let counters: Vec<MessageCounter> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let rank = comm.rank();
                        let mut tree = CompletionTree::new(rank, 2, 1);
                        let mut ctr = MessageCounter::default();
                        tree.post_recvs(&mut ctr);

                        // rank 1 completes the single global history
                        let mut n_complete = u64::from(rank == 1);
                        while !tree.finished() {
                            tree.progress(&comm, &mut ctr, &mut n_complete, true).unwrap();
                        }
                        tree.broadcast_down(&comm, &mut ctr).unwrap();
                        comm.barrier();
                        tree.close_requests(&comm, &mut ctr).unwrap();
                        ctr
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for ctr in &counters {
            assert!(ctr.balanced(), "unbalanced counters: {ctr:?}");
        }
    }
}
