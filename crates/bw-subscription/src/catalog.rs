//! Well-known filter lists offered when adding a subscription.

/// Primary EasyList location. Limited mode applies to this list only.
pub const EASYLIST_URL: &str = "https://easylist-downloads.adblockplus.org/easylist.txt";

/// Entry of the known-subscription catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownSubscription {
    /// Catalog label, e.g. "EasyList (English)"
    pub label: &'static str,
    pub url: &'static str,
}

impl KnownSubscription {
    /// Title used for a new subscription: the label without its trailing
    /// language note.
    pub fn title(&self) -> &'static str {
        match self.label.find('(') {
            Some(pos) if pos > 0 => self.label[..pos].trim(),
            _ => self.label,
        }
    }
}

const KNOWN_SUBSCRIPTIONS: &[KnownSubscription] = &[
    KnownSubscription { label: "EasyList (English)", url: EASYLIST_URL },
    KnownSubscription { label: "Adversity (English)", url: "https://raw.githubusercontent.com/Hubird-au/Adversity/master/Adversity.txt" },
    KnownSubscription { label: "BSI Lista Polska (Polish)", url: "http://www.bsi.info.pl/filtrABP.txt" },
    KnownSubscription { label: "Czech List (Czech)", url: "http://adblock.dajbych.net/adblock.txt" },
    KnownSubscription { label: "dutchblock (Dutch)", url: "http://groenewoudt.net/dutchblock/list.txt" },
    KnownSubscription { label: "Filtros Nauscopicos (Spanish)", url: "http://abp.mozilla-hispano.org/nauscopio/filtros.txt" },
    KnownSubscription { label: "hufilter (Hungarian)", url: "http://www.hufilter.hu/hufilter.txt" },
    KnownSubscription { label: "IsraelList (Hebrew)", url: "https://www.fanboy.co.nz/israelilist/IsraelList.txt" },
    KnownSubscription { label: "Lista Basa (Polish)", url: "https://plok.studentlive.pl/abp.txt" },
    KnownSubscription { label: "NLBlock (Dutch)", url: "http://www.verzijlbergh.com/adblock/nlblock.txt" },
    KnownSubscription { label: "Peter Lowe's list (English)", url: "http://pgl.yoyo.org/adservers/serverlist.php?hostformat=adblockplus&mimetype=plaintext" },
    KnownSubscription { label: "PLgeneral (Polish)", url: "http://www.niecko.pl/adblock/adblock.txt" },
    KnownSubscription { label: "Schacks Adblock Plus liste (Danish)", url: "https://adblock.schack.dk/block.txt" },
    KnownSubscription { label: "Xfiles (Italian)", url: "https://raw.githubusercontent.com/gioxx/xfiles/master/filtri.txt" },
    KnownSubscription { label: "EasyPrivacy (English)", url: "https://easylist-downloads.adblockplus.org/easyprivacy.txt" },
    KnownSubscription { label: "Antisocial (English)", url: "https://raw.githubusercontent.com/Hubird-au/Adversity/master/Antisocial.txt" },
    KnownSubscription { label: "RuAdList+EasyList (Russian, Ukrainian)", url: "https://easylist-downloads.adblockplus.org/ruadlist+easylist.txt" },
    KnownSubscription { label: "RU AdList (Russian, Ukrainian)", url: "https://easylist-downloads.adblockplus.org/advblock.txt" },
    KnownSubscription { label: "ABPindo (Indonesian)", url: "https://raw.githubusercontent.com/heradhis/indonesianadblockrules/master/subscriptions/abpindo.txt" },
    KnownSubscription { label: "Easylist China (Chinese)", url: "https://easylist-downloads.adblockplus.org/easylistchina.txt" },
    KnownSubscription { label: "Malware Domains", url: "https://easylist-downloads.adblockplus.org/malwaredomains_full.txt" },
];

pub fn known_subscriptions() -> &'static [KnownSubscription] {
    KNOWN_SUBSCRIPTIONS
}

/// Look up a catalog entry by title, label or URL (case-insensitive).
pub fn find_known(query: &str) -> Option<&'static KnownSubscription> {
    KNOWN_SUBSCRIPTIONS.iter().find(|known| {
        known.title().eq_ignore_ascii_case(query)
            || known.label.eq_ignore_ascii_case(query)
            || known.url == query
    })
}
