//! Virtual folders over several live sources.

use std::collections::BTreeSet;
use std::io::{self, Cursor, Read};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use foldex_core::vee::make_vuid;
use foldex_core::{
    BodySource, CancellationToken, ChangeInfo, Folder, IndexConfig, MailFolder, MessageRecord,
    SystemFlags, Uid, VeeFolder,
};

const FLAGGED_UNSEEN: &str =
    r#"(match-all (and (system-flag "Flagged") (not (system-flag "Seen"))))"#;

fn source(name: &str, count: u32) -> Folder {
    let folder = Folder::new(name);
    for i in 1..=count {
        let flags = match i % 3 {
            0 => SystemFlags::FLAGGED,
            1 => SystemFlags::FLAGGED | SystemFlags::SEEN,
            _ => SystemFlags::empty(),
        };
        folder.insert(
            MessageRecord::new(i.to_string())
                .with_flags(flags)
                .with_subject(format!("{name} message {i}")),
        );
    }
    folder
}

/// Members a virtual folder should have right now.
fn expected(vee: &VeeFolder, sources: &[&Folder]) -> BTreeSet<Uid> {
    let cancel = CancellationToken::new();
    let mut out = BTreeSet::new();
    for folder in sources {
        let hash = vee.source_hash_of(folder).unwrap();
        for uid in folder.search(&vee.expression(), None, &cancel).unwrap() {
            out.insert(make_vuid(&hash, &uid));
        }
    }
    out
}

fn members(vee: &VeeFolder) -> BTreeSet<Uid> {
    vee.uids().into_iter().collect()
}

#[test]
fn membership_is_union_of_source_matches() {
    let inbox = source("INBOX", 12);
    let work = source("Work", 7);
    let lists = source("Lists", 5);
    let vee = VeeFolder::new("Flagged", FLAGGED_UNSEEN, &IndexConfig::default()).unwrap();
    for folder in [&inbox, &work, &lists] {
        vee.add_source(folder).unwrap();
    }
    let all = [&inbox, &work, &lists];
    assert_eq!(members(&vee), expected(&vee, &all));

    // External changes in every source.
    inbox.set_flags("1", SystemFlags::SEEN, SystemFlags::empty());
    inbox.set_flags("3", SystemFlags::SEEN, SystemFlags::SEEN);
    work.insert(MessageRecord::new("100").with_flags(SystemFlags::FLAGGED));
    work.remove("3");
    lists.freeze();
    lists.set_flags("2", SystemFlags::FLAGGED, SystemFlags::FLAGGED);
    lists.set_flags("4", SystemFlags::FLAGGED, SystemFlags::FLAGGED);
    lists.thaw();
    assert_eq!(members(&vee), expected(&vee, &all));

    // Writes through the virtual folder.
    let first = vee.uids()[0].clone();
    assert!(vee.set_flags(&first, SystemFlags::SEEN, SystemFlags::SEEN));
    assert_eq!(members(&vee), expected(&vee, &all));

    assert!(vee.remove_source(&work));
    let remaining = [&inbox, &lists];
    assert_eq!(members(&vee), expected(&vee, &remaining));

    vee.resync().unwrap();
    assert_eq!(members(&vee), expected(&vee, &remaining));
}

#[test]
fn counters_follow_membership() {
    let inbox = source("INBOX", 9);
    let vee = VeeFolder::new("All", "(match-all #t)", &IndexConfig::default()).unwrap();
    vee.add_source(&inbox).unwrap();
    assert_eq!(vee.counters(), inbox.counters());

    inbox.set_flags("2", SystemFlags::JUNK, SystemFlags::JUNK);
    inbox.remove("4");
    assert_eq!(vee.counters(), inbox.counters());

    let vuid = vee.uids()[0].clone();
    vee.set_flags(&vuid, SystemFlags::DELETED, SystemFlags::DELETED);
    assert_eq!(vee.counters(), inbox.counters());
}

#[test]
fn writes_through_vfolder_do_not_echo() {
    let inbox = source("INBOX", 6);
    let vee = VeeFolder::new("All", "(match-all #t)", &IndexConfig::default()).unwrap();
    let hash = vee.add_source(&inbox).unwrap();

    let events = Arc::new(Mutex::new(Vec::<ChangeInfo>::new()));
    let sink = Arc::clone(&events);
    vee.on_change(Arc::new(move |c: &ChangeInfo| {
        sink.lock().unwrap().push(c.clone());
    }));

    let vuid = make_vuid(&hash, "2");
    assert!(vee.set_flags(&vuid, SystemFlags::SEEN, SystemFlags::SEEN));
    assert!(vee.set_user_flag(&vuid, "todo", true));
    assert!(vee.set_user_tag(&vuid, "color", Some("red")));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 3);
    for event in events.iter() {
        assert!(event.added.is_empty());
        assert!(event.removed.is_empty());
        assert_eq!(event.changed.len(), 1);
        assert!(event.changed.contains(&vuid));
    }
}

#[test]
fn nested_writes_across_two_vfolders() {
    let inbox = source("INBOX", 6);
    let all = VeeFolder::new("All", "(match-all #t)", &IndexConfig::default()).unwrap();
    let unread = VeeFolder::new(
        "Unread",
        r#"(match-all (not (system-flag "Seen")))"#,
        &IndexConfig::default(),
    )
    .unwrap();
    let all_hash = all.add_source(&inbox).unwrap();
    let unread_hash = unread.add_source(&inbox).unwrap();
    let before = unread.uids().len();

    // A write through one virtual folder is an external change to the other.
    assert!(all.set_flags(&make_vuid(&all_hash, "2"), SystemFlags::SEEN, SystemFlags::SEEN));

    // Unread folders keep messages read elsewhere until resynced.
    assert!(unread.is_unread_mode());
    assert_eq!(unread.uids().len(), before);
    let record = unread.virtual_record(&make_vuid(&unread_hash, "2")).unwrap();
    assert!(record.is_stale());
    assert!(record.old_flags().contains(SystemFlags::SEEN));

    unread.resync().unwrap();
    assert_eq!(unread.uids().len(), before - 1);
    assert_eq!(
        unread.approximate_visible_count(),
        unread.counters().visible
    );
}

#[test]
fn virtual_records_show_real_data() {
    let inbox = source("INBOX", 3);
    let vee = VeeFolder::new("All", "(match-all #t)", &IndexConfig::default()).unwrap();
    let hash = vee.add_source(&inbox).unwrap();

    let vuid = make_vuid(&hash, "2");
    let view = vee.get(&vuid).unwrap();
    assert_eq!(view.uid, vuid);
    assert_eq!(view.subject, "INBOX message 2");

    let cancel = CancellationToken::new();
    let found = vee
        .search(r#"(header-contains "subject" "message 2")"#, None, &cancel)
        .unwrap();
    assert_eq!(found, vec![vuid]);
}

#[derive(Default)]
struct Gate {
    armed: bool,
    waiting: bool,
    open: bool,
}

/// Body source whose next fetch, once armed, blocks until opened.
#[derive(Default)]
struct GatedBodies {
    gate: Mutex<Gate>,
    changed: Condvar,
}

impl GatedBodies {
    fn arm(&self) {
        self.gate.lock().unwrap().armed = true;
    }

    fn wait_until_blocked(&self) {
        let mut gate = self.gate.lock().unwrap();
        while !gate.waiting {
            gate = self.changed.wait(gate).unwrap();
        }
    }

    fn open(&self) {
        self.gate.lock().unwrap().open = true;
        self.changed.notify_all();
    }
}

impl BodySource for GatedBodies {
    fn is_cached(&self, _uid: &str) -> bool {
        true
    }

    fn fetch_body(&self, _uid: &str, _cancel: &CancellationToken) -> io::Result<Box<dyn Read + Send>> {
        let mut gate = self.gate.lock().unwrap();
        if gate.armed {
            gate.armed = false;
            gate.waiting = true;
            self.changed.notify_all();
            while !gate.open {
                gate = self.changed.wait(gate).unwrap();
            }
        }
        Ok(Box::new(Cursor::new(b"hello world".to_vec())))
    }
}

#[test]
fn slow_re_evaluation_does_not_overwrite_newer_change() {
    let bodies = Arc::new(GatedBodies::default());
    let inbox = Folder::builder("INBOX").body_source(bodies.clone()).build();
    inbox.insert(MessageRecord::new("1"));

    let mut config = IndexConfig::default();
    config.vfolder.unread_mode = Some(false);
    let vee = VeeFolder::new(
        "Greetings",
        r#"(match-all (and (not (system-flag "Seen")) (body-contains "hello")))"#,
        &config,
    )
    .unwrap();
    vee.add_source(&inbox).unwrap();
    assert_eq!(members(&vee).len(), 1);

    // The first re-evaluation stalls in the body fetch while the message
    // is marked read on another thread.
    bodies.arm();
    let flagger = {
        let inbox = inbox.clone();
        thread::spawn(move || inbox.set_flags("1", SystemFlags::FLAGGED, SystemFlags::FLAGGED))
    };
    bodies.wait_until_blocked();
    let reader = {
        let inbox = inbox.clone();
        thread::spawn(move || inbox.set_flags("1", SystemFlags::SEEN, SystemFlags::SEEN))
    };
    thread::sleep(Duration::from_millis(50));
    bodies.open();
    assert!(flagger.join().unwrap());
    assert!(reader.join().unwrap());

    assert!(expected(&vee, &[&inbox]).is_empty());
    assert_eq!(members(&vee), expected(&vee, &[&inbox]));
}
